//! Postgres store for popups and the alert bookkeeping around them.
//!
//! A `PgStore` wraps a single-connection pool: the pipeline opens one per
//! stage and closes it when the stage ends.

pub mod error;
#[cfg(test)]
mod testutil;

pub use error::{Result, StoreError};

use chrono::{NaiveDate, NaiveTime};
use poppang_common::Subscription;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// A popup row ready for insertion, with its ordered images and category ids.
#[derive(Debug, Clone)]
pub struct NewPopup {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    pub address: String,
    pub road_address: String,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub geocoding_query: Option<String>,
    pub insta_post_id: String,
    pub insta_post_url: String,
    pub caption_summary: String,
    pub caption: String,
    pub media_type: String,
    /// Public image paths in display order.
    pub images: Vec<String>,
    pub category_ids: Vec<i32>,
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert a popup with its images and categories as one transaction.
    ///
    /// Returns the generated `(id, uuid)`. Any failure rolls back the whole unit.
    pub async fn insert_popup(&self, popup: &NewPopup) -> Result<(i64, Uuid)> {
        let mut tx = self.pool.begin().await?;

        let (id, uuid): (i64, Uuid) = sqlx::query_as(
            r#"
            INSERT INTO popup (
                name, start_date, end_date, open_time, close_time,
                address, road_address, region, latitude, longitude,
                geocoding_query, insta_post_id, insta_post_url,
                caption_summary, caption, media_type, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, TRUE)
            RETURNING id, uuid
            "#,
        )
        .bind(&popup.name)
        .bind(popup.start_date)
        .bind(popup.end_date)
        .bind(popup.open_time)
        .bind(popup.close_time)
        .bind(&popup.address)
        .bind(&popup.road_address)
        .bind(&popup.region)
        .bind(popup.latitude)
        .bind(popup.longitude)
        .bind(&popup.geocoding_query)
        .bind(&popup.insta_post_id)
        .bind(&popup.insta_post_url)
        .bind(&popup.caption_summary)
        .bind(&popup.caption)
        .bind(&popup.media_type)
        .fetch_one(&mut *tx)
        .await?;

        for (sort_order, path) in popup.images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO popup_image (popup_id, image_url, sort_order) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(path)
            .bind(sort_order as i32)
            .execute(&mut *tx)
            .await?;
        }

        for category_id in &popup.category_ids {
            sqlx::query(
                "INSERT INTO popup_recommend (popup_id, recommend_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(id, %uuid, images = popup.images.len(), "Inserted popup");
        Ok((id, uuid))
    }

    /// Keyword subscriptions of users who are not deleted and have alerts on,
    /// grouped one entry per user.
    pub async fn active_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, (i64, String, String, String)>(
            r#"
            SELECT u.id, u.nickname, u.fcm_token, k.alert_keyword
            FROM users u
            JOIN user_alert_keyword k ON k.users_id = u.id
            WHERE u.is_deleted = 0 AND u.is_alerted = 1
            ORDER BY u.id, k.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(group_subscriptions(rows))
    }

    /// Record that `user_id` was alerted about `popup_id`.
    ///
    /// Returns `false` when the pair was already recorded.
    pub async fn record_alert(&self, user_id: i64, popup_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO user_alert (users_id, popup_id) VALUES ($1, $2) \
             ON CONFLICT (users_id, popup_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(popup_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn group_subscriptions(rows: Vec<(i64, String, String, String)>) -> Vec<Subscription> {
    let mut subs: Vec<Subscription> = Vec::new();
    for (user_id, nickname, push_token, keyword) in rows {
        let keyword = keyword.trim().to_string();
        match subs.last_mut() {
            Some(last) if last.user_id == user_id => {
                if !keyword.is_empty() && !last.keywords.contains(&keyword) {
                    last.keywords.push(keyword);
                }
            }
            _ => subs.push(Subscription {
                user_id,
                nickname,
                push_token,
                keywords: if keyword.is_empty() {
                    Vec::new()
                } else {
                    vec![keyword]
                },
            }),
        }
    }
    subs.retain(|s| !s.keywords.is_empty());
    subs
}
