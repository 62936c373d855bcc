use admin_core::PositionStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    Product, ProductDraft, ProductId, Testimonial, TestimonialDraft, TestimonialId,
};

const PRODUCT_COLUMNS: &str =
    "id, created_at, title, price, old_price, description, image, buy_url, position";
const TESTIMONIAL_COLUMNS: &str = "id, created_at, name, role, text, image, position";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY position ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list products")?;
        rows.iter().map(product_from_row).collect()
    }

    pub async fn load_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(product_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    /// Inserts a product after the current last position.
    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Product> {
        let row = sqlx::query(&format!(
            "INSERT INTO products (title, price, old_price, description, image, buy_url, position)
             VALUES (?, ?, ?, ?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM products))
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.price)
        .bind(&draft.old_price)
        .bind(&draft.description)
        .bind(&draft.image)
        .bind(&draft.buy_url)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert product")?;
        product_from_row(&row)
    }

    pub async fn update_product(
        &self,
        product_id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "UPDATE products
             SET title = ?, price = ?, old_price = ?, description = ?, image = ?, buy_url = ?
             WHERE id = ?
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&draft.title)
        .bind(&draft.price)
        .bind(&draft.old_price)
        .bind(&draft.description)
        .bind(&draft.image)
        .bind(&draft.buy_url)
        .bind(product_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    /// Remaining positions are left as they are; the next reorder closes the gap.
    pub async fn delete_product(&self, product_id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(product_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_product_position(&self, product_id: ProductId, position: u32) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET position = ? WHERE id = ?")
            .bind(position)
            .bind(product_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_testimonials(&self) -> Result<Vec<Testimonial>> {
        let rows = sqlx::query(&format!(
            "SELECT {TESTIMONIAL_COLUMNS} FROM testimonials ORDER BY position ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list testimonials")?;
        rows.iter().map(testimonial_from_row).collect()
    }

    pub async fn load_testimonial(
        &self,
        testimonial_id: TestimonialId,
    ) -> Result<Option<Testimonial>> {
        let row = sqlx::query(&format!(
            "SELECT {TESTIMONIAL_COLUMNS} FROM testimonials WHERE id = ?"
        ))
        .bind(testimonial_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(testimonial_from_row).transpose()
    }

    pub async fn create_testimonial(&self, draft: &TestimonialDraft) -> Result<Testimonial> {
        let row = sqlx::query(&format!(
            "INSERT INTO testimonials (name, role, text, image, position)
             VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM testimonials))
             RETURNING {TESTIMONIAL_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.role)
        .bind(&draft.text)
        .bind(&draft.image)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert testimonial")?;
        testimonial_from_row(&row)
    }

    pub async fn update_testimonial(
        &self,
        testimonial_id: TestimonialId,
        draft: &TestimonialDraft,
    ) -> Result<Option<Testimonial>> {
        let row = sqlx::query(&format!(
            "UPDATE testimonials
             SET name = ?, role = ?, text = ?, image = ?
             WHERE id = ?
             RETURNING {TESTIMONIAL_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(&draft.role)
        .bind(&draft.text)
        .bind(&draft.image)
        .bind(testimonial_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(testimonial_from_row).transpose()
    }

    pub async fn delete_testimonial(&self, testimonial_id: TestimonialId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM testimonials WHERE id = ?")
            .bind(testimonial_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_testimonial_position(
        &self,
        testimonial_id: TestimonialId,
        position: u32,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE testimonials SET position = ? WHERE id = ?")
            .bind(position)
            .bind(testimonial_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PositionStore<ProductId> for Storage {
    async fn set_position(&self, id: ProductId, position: u32) -> Result<()> {
        if !self.set_product_position(id, position).await? {
            return Err(anyhow!("product {id} no longer exists"));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore<TestimonialId> for Storage {
    async fn set_position(&self, id: TestimonialId, position: u32) -> Result<()> {
        if !self.set_testimonial_position(id, position).await? {
            return Err(anyhow!("testimonial {id} no longer exists"));
        }
        Ok(())
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: ProductId(row.try_get::<i64, _>("id")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        title: row.try_get("title")?,
        price: row.try_get("price")?,
        old_price: row.try_get("old_price")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        buy_url: row.try_get("buy_url")?,
        position: row.try_get::<u32, _>("position")?,
    })
}

fn testimonial_from_row(row: &SqliteRow) -> Result<Testimonial> {
    Ok(Testimonial {
        id: TestimonialId(row.try_get::<i64, _>("id")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        text: row.try_get("text")?,
        image: row.try_get("image")?,
        position: row.try_get::<u32, _>("position")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
