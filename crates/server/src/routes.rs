//! `/api` routes and their handlers.
//!
//! Handlers only translate between HTTP and the services: access rules,
//! validation and state checks all live in the service layer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use model::{
    Cart, Category, Credential, Delivery, DeliveryStatus, Order, OrderStatus, Payment,
    PaymentMethod, PaymentStatus, Product, Role, User,
};
use serde::Deserialize;
use service::{
    Account, Caller, CategoryPatch, NewCategory, NewProduct, OrderDetails, PasswordChange,
    ProductPatch, ProfilePatch, SignUp,
};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::{AppState, Services};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SignIn {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct Quantity {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct Username {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct NewPayment {
    pub method: PaymentMethod,
}

/// Body of every status-changing request.
#[derive(Debug, Deserialize)]
pub struct StatusChange<T> {
    pub status: T,
}

pub fn api() -> Router<AppState> {
    Router::new()
        // accounts
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/me", get(profile).patch(update_profile))
        .route("/users/{id}", get(get_user))
        .route("/credentials/{id}", get(get_credential))
        .route("/credentials/{id}/username", put(change_username))
        .route("/credentials/{id}/password", put(change_password))
        .route("/credentials/{id}/role", put(change_role))
        .route("/credentials/{id}/deactivate", post(deactivate))
        .route("/credentials/{id}/activate", post(activate))
        // catalog
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).patch(update_product).delete(deactivate_product),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category).patch(update_category).delete(delete_category),
        )
        // cart
        .route("/cart", get(active_cart).delete(clear_cart))
        .route("/cart/lines", post(add_line))
        .route("/cart/lines/{id}", patch(update_line).delete(remove_line))
        .route("/carts/{id}", get(get_cart))
        // orders, payments, deliveries
        .route("/orders", get(order_history).post(checkout))
        .route("/orders/{id}", get(get_order).delete(delete_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/status", put(force_order_status))
        .route("/orders/{id}/payment", get(payment_for_order).post(register_payment))
        .route("/orders/{id}/payment/confirm", post(confirm_payment))
        .route("/orders/{id}/payment/fail", post(fail_payment))
        .route("/orders/{id}/payment/status", put(update_payment_status))
        .route("/orders/{id}/delivery", post(register_delivery))
        .route("/payments/{id}", get(get_payment))
        .route("/deliveries/{id}", get(get_delivery))
        .route("/deliveries/{id}/status", put(update_delivery_status))
        // admin listings
        .route("/admin/products", get(list_all_products))
        .route("/admin/users", get(list_users))
        .route("/admin/credentials", get(list_credentials))
        .route("/admin/carts", get(list_carts))
        .route("/admin/orders", get(list_orders))
        .route("/admin/payments", get(list_payments))
        .route("/admin/deliveries", get(list_deliveries))
}

// --- accounts ---

async fn sign_up(
    State(s): State<Services>,
    Json(input): Json<SignUp>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let account = s.accounts.sign_up(input).await?;
    info!(credential_id = %account.credential.id, "Account created");
    Ok((StatusCode::CREATED, Json(account)))
}

async fn sign_in(State(s): State<Services>, Json(body): Json<SignIn>) -> ApiResult<Caller> {
    Ok(Json(s.accounts.authenticate(&body.username, &body.password).await?))
}

async fn profile(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<User> {
    Ok(Json(s.accounts.profile(&caller).await?))
}

async fn update_profile(
    State(s): State<Services>,
    Identity(caller): Identity,
    Json(patch): Json<ProfilePatch>,
) -> ApiResult<User> {
    Ok(Json(s.accounts.update_profile(&caller, patch).await?))
}

async fn list_users(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<Vec<User>> {
    Ok(Json(s.accounts.list_users(&caller).await?))
}

async fn get_user(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    Ok(Json(s.accounts.get_user(&caller, id).await?))
}

async fn list_credentials(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Credential>> {
    Ok(Json(s.accounts.list_credentials(&caller).await?))
}

async fn get_credential(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Credential> {
    Ok(Json(s.accounts.get_credential(&caller, id).await?))
}

async fn change_username(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<Username>,
) -> ApiResult<Credential> {
    Ok(Json(s.accounts.change_username(&caller, id, &body.username).await?))
}

async fn change_password(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    s.accounts.change_password(&caller, id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_role(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<RoleChange>,
) -> ApiResult<Credential> {
    Ok(Json(s.accounts.change_role(&caller, id, body.role).await?))
}

async fn deactivate(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.accounts.deactivate(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.accounts.activate(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- catalog ---

async fn list_products(State(s): State<Services>) -> ApiResult<Vec<Product>> {
    Ok(Json(s.catalog.list_products().await?))
}

async fn list_all_products(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Product>> {
    Ok(Json(s.catalog.list_all_products(&caller).await?))
}

async fn get_product(State(s): State<Services>, Path(id): Path<Uuid>) -> ApiResult<Product> {
    Ok(Json(s.catalog.get_product(id).await?))
}

async fn create_product(
    State(s): State<Services>,
    Identity(caller): Identity,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = s.catalog.create_product(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Product> {
    Ok(Json(s.catalog.update_product(&caller, id, patch).await?))
}

async fn deactivate_product(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Product> {
    Ok(Json(s.catalog.deactivate_product(&caller, id).await?))
}

async fn list_categories(State(s): State<Services>) -> ApiResult<Vec<Category>> {
    Ok(Json(s.catalog.list_categories().await?))
}

async fn get_category(State(s): State<Services>, Path(id): Path<Uuid>) -> ApiResult<Category> {
    Ok(Json(s.catalog.get_category(id).await?))
}

async fn create_category(
    State(s): State<Services>,
    Identity(caller): Identity,
    Json(input): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = s.catalog.create_category(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(patch): Json<CategoryPatch>,
) -> ApiResult<Category> {
    Ok(Json(s.catalog.update_category(&caller, id, patch).await?))
}

async fn delete_category(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    s.catalog.delete_category(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- cart ---

async fn active_cart(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<Cart> {
    Ok(Json(s.carts.get_active_cart(&caller).await?))
}

async fn clear_cart(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<Cart> {
    Ok(Json(s.carts.clear(&caller).await?))
}

async fn add_line(
    State(s): State<Services>,
    Identity(caller): Identity,
    Json(body): Json<NewLine>,
) -> ApiResult<Cart> {
    Ok(Json(s.carts.add_line(&caller, body.product_id, body.quantity).await?))
}

async fn update_line(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<Quantity>,
) -> ApiResult<Cart> {
    Ok(Json(s.carts.update_line_quantity(&caller, id, body.quantity).await?))
}

async fn remove_line(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Cart> {
    Ok(Json(s.carts.remove_line(&caller, id).await?))
}

async fn get_cart(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Cart> {
    Ok(Json(s.carts.get(&caller, id).await?))
}

async fn list_carts(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<Vec<Cart>> {
    Ok(Json(s.carts.list_all(&caller).await?))
}

// --- orders ---

async fn checkout(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = s.orders.checkout(&caller).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn order_history(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Order>> {
    Ok(Json(s.orders.history(&caller).await?))
}

async fn get_order(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    Ok(Json(s.orders.get(&caller, id).await?))
}

async fn cancel_order(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    Ok(Json(s.orders.cancel(&caller, id).await?))
}

async fn force_order_status(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<OrderStatus>>,
) -> ApiResult<Order> {
    Ok(Json(s.orders.force_status(&caller, id, body.status).await?))
}

async fn delete_order(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    Ok(Json(s.orders.delete(&caller, id).await?))
}

async fn list_orders(State(s): State<Services>, Identity(caller): Identity) -> ApiResult<Vec<Order>> {
    Ok(Json(s.orders.list_all(&caller).await?))
}

// --- payments ---

async fn register_payment(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
    Json(body): Json<NewPayment>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = s.payments.register(&caller, order_id, body.method).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn payment_for_order(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Payment> {
    Ok(Json(s.payments.for_order(&caller, order_id).await?))
}

async fn confirm_payment(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Payment> {
    Ok(Json(s.payments.confirm(&caller, order_id).await?))
}

async fn fail_payment(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Payment> {
    Ok(Json(s.payments.mark_failed(&caller, order_id).await?))
}

async fn update_payment_status(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
    Json(body): Json<StatusChange<PaymentStatus>>,
) -> ApiResult<Payment> {
    Ok(Json(s.payments.update_status(&caller, order_id, body.status).await?))
}

async fn get_payment(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Payment> {
    Ok(Json(s.payments.get(&caller, id).await?))
}

async fn list_payments(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Payment>> {
    Ok(Json(s.payments.list_all(&caller).await?))
}

// --- deliveries ---

async fn register_delivery(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(order_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Delivery>), ApiError> {
    let delivery = s.deliveries.register(&caller, order_id).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

async fn get_delivery(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> ApiResult<Delivery> {
    Ok(Json(s.deliveries.get(&caller, id).await?))
}

async fn update_delivery_status(
    State(s): State<Services>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange<DeliveryStatus>>,
) -> ApiResult<Delivery> {
    Ok(Json(s.deliveries.update_status(&caller, id, body.status).await?))
}

async fn list_deliveries(
    State(s): State<Services>,
    Identity(caller): Identity,
) -> ApiResult<Vec<Delivery>> {
    Ok(Json(s.deliveries.list_all(&caller).await?))
}
