//! Product handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{tenant_actor, visible_project};
use crate::AppState;
use pledgehub_common::{
    auth::{AuthContext, MaybeAuth},
    db::{models::Product, NewProduct},
    domain::money,
    errors::{AppError, Result},
    policy::{authorize, can_manage_project},
    tenancy::CurrentTenant,
};

/// Upper bound on products per project
const MAX_PRODUCTS: usize = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,

    pub price: Decimal,

    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplaceProductsRequest {
    #[validate(nested)]
    pub products: Vec<ProductInput>,
}

pub async fn list_products(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    MaybeAuth(auth): MaybeAuth,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Product>>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, auth.as_ref(), tenant.id).await?;
    let (project, _) = visible_project(&repo, tenant.id, project_id, &actor).await?;

    Ok(Json(repo.list_products(project.id).await?))
}

/// Replace the whole product list; list position becomes the sort order
pub async fn replace_products(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ReplaceProductsRequest>,
) -> Result<Json<Vec<Product>>> {
    let repo = state.repo();
    let actor = tenant_actor(&repo, Some(&auth), tenant.id).await?;
    let (project, facts) = visible_project(&repo, tenant.id, project_id, &actor).await?;
    authorize(can_manage_project(&actor, &facts), "edit this project's products")?;

    if !facts.status.allows_financial_edits() {
        return Err(AppError::guard(
            "products can only change while the project is a draft",
        ));
    }

    let products = to_new_products(request)?;
    let products = repo.replace_products(project.id, products).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        project_id = %project.id,
        count = products.len(),
        user_id = %auth.user_id,
        "Products replaced"
    );

    Ok(Json(products))
}

fn to_new_products(request: ReplaceProductsRequest) -> Result<Vec<NewProduct>> {
    request.validate()?;
    if request.products.len() > MAX_PRODUCTS {
        return Err(AppError::invalid_field(
            "products",
            format!("at most {} products per project", MAX_PRODUCTS),
        ));
    }

    request
        .products
        .into_iter()
        .map(|input| {
            Ok(NewProduct {
                price: money::ensure_positive_amount("price", input.price)?,
                name: input.name.trim().to_string(),
                description: input.description,
                image_url: input.image_url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> ReplaceProductsRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_products_keep_order() {
        let products = to_new_products(request(
            r#"{"products":[
                {"name":"Brick","price":"10.00"},
                {"name":"Window","price":"250.50","image_url":"https://cdn.example.org/w.png"}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Brick");
        assert_eq!(products[1].price, Decimal::new(25050, 2));
    }

    #[test]
    fn test_empty_list_clears_products() {
        assert!(to_new_products(request(r#"{"products":[]}"#)).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_products() {
        let zero = to_new_products(request(r#"{"products":[{"name":"Free","price":"0"}]}"#));
        assert!(matches!(zero, Err(AppError::Validation { .. })));

        let unnamed = to_new_products(request(r#"{"products":[{"name":"","price":"5"}]}"#));
        assert!(unnamed.is_err());

        let bad_url = to_new_products(request(
            r#"{"products":[{"name":"Pew","price":"5","image_url":"not a url"}]}"#,
        ));
        assert!(bad_url.is_err());
    }
}
