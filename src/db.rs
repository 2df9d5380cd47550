use sqlx::{Pool, Postgres};

use crate::store::StoreResult;

pub type Db = Pool<Postgres>;

/// Connects and brings the schema up to date.
pub async fn connect(url: &str) -> StoreResult<Db> {
    let pool = Pool::<Postgres>::connect(url).await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
