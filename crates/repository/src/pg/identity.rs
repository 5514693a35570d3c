use async_trait::async_trait;
use model::{Credential, User};
use tokio_postgres::Row;
use uuid::Uuid;

use super::{PgSession, constraint_error, expect_one};
use crate::{CredentialsRepository, RepositoryError, UsersRepository};

const CREDENTIAL_COLUMNS: &str = "id, username, password_hash, role, active, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, credential_id, name, last_name, email, phone, address, active, created_at, updated_at";

fn credential_from_row(row: &Row) -> Credential {
    Credential {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        credential_id: row.get("credential_id"),
        name: row.get("name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl CredentialsRepository for PgSession {
    async fn list_credentials(&mut self) -> Result<Vec<Credential>, RepositoryError> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY created_at DESC");
        let rows = self.db()?.query(query.as_str(), &[]).await?;
        Ok(rows.iter().map(credential_from_row).collect())
    }

    async fn get_credential(&mut self, id: Uuid) -> Result<Option<Credential>, RepositoryError> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(credential_from_row))
    }

    async fn find_credential_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Credential>, RepositoryError> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE username = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&username]).await?;
        Ok(row.as_ref().map(credential_from_row))
    }

    async fn insert_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO credentials (id, username, password_hash, role, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;
        self.db()?
            .execute(query, &[
                &credential.id,
                &credential.username,
                &credential.password_hash,
                &credential.role,
                &credential.active,
                &credential.created_at,
                &credential.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "username"))?;
        Ok(())
    }

    async fn update_credential(&mut self, credential: &Credential) -> Result<(), RepositoryError> {
        let query = r#"
            UPDATE credentials
            SET username = $2, password_hash = $3, role = $4, active = $5, updated_at = $6
            WHERE id = $1
        "#;
        let affected = self
            .db()?
            .execute(query, &[
                &credential.id,
                &credential.username,
                &credential.password_hash,
                &credential.role,
                &credential.active,
                &credential.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "username"))?;
        expect_one(affected)
    }
}

#[async_trait]
impl UsersRepository for PgSession {
    async fn list_users(&mut self) -> Result<Vec<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let rows = self.db()?.query(query.as_str(), &[]).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn get_user(&mut self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&id]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row = self.db()?.query_opt(query.as_str(), &[&email]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_credential(
        &mut self,
        credential_id: Uuid,
    ) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE credential_id = $1");
        let row = self.db()?.query_opt(query.as_str(), &[&credential_id]).await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO users (id, credential_id, name, last_name, email, phone, address, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#;
        self.db()?
            .execute(query, &[
                &user.id,
                &user.credential_id,
                &user.name,
                &user.last_name,
                &user.email,
                &user.phone,
                &user.address,
                &user.active,
                &user.created_at,
                &user.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "email"))?;
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        let query = r#"
            UPDATE users
            SET name = $2, last_name = $3, email = $4, phone = $5, address = $6,
                active = $7, updated_at = $8
            WHERE id = $1
        "#;
        let affected = self
            .db()?
            .execute(query, &[
                &user.id,
                &user.name,
                &user.last_name,
                &user.email,
                &user.phone,
                &user.address,
                &user.active,
                &user.updated_at,
            ])
            .await
            .map_err(|e| constraint_error(e, "email"))?;
        expect_one(affected)
    }
}
