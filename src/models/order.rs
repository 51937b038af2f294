use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub uuid: Uuid,
    pub user_id: Option<i64>,
    pub retailer_group_id: Option<i64>,
    pub datetime_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub description: String,
    pub amount: Money,
}

impl Order {
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Option<i64>,
        retailer_group_id: Option<i64>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO orders (uuid, user_id, retailer_group_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(retailer_group_id)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn add_item(
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        description: &str,
        amount: Money,
    ) -> Result<OrderItem, sqlx::Error> {
        sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, description, amount)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(description)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
    }
}
