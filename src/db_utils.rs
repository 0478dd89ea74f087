use anyhow::anyhow;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{error, info};

pub async fn get_pg_connection_pool(pg_url: &str, num_attempts: u32) -> Result<PgPool, anyhow::Error> {
    info!("Trying to establish a PostgreSQL connection pool");

    let mut attempts = 0;
    let mut err: Option<anyhow::Error> = None;

    while attempts < num_attempts {
        info!("Attempt to connect to PostgreSQL {} of {}", attempts + 1, num_attempts);
        match PgPoolOptions::new()
            .max_connections(10)
            .connect(pg_url)
            .await
        {
            Ok(pg_con_pool) => {
                info!("PostgreSQL connection successful \u{2705}");
                return Ok(pg_con_pool)
            },
            Err(e) => {
                error!("Failed to connect to PostgreSQL. Attempt {} of {}: {}", attempts + 1, num_attempts, e);
                err = Some(anyhow!(e));
            }
        }
        attempts += 1;
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
    Err(err.unwrap_or_else(|| anyhow!("Failed to connect to PostgreSQL")))
}

pub async fn tables_exist(pg_con_pool: &PgPool, table_names: &[&str]) -> Result<bool, anyhow::Error> {
    info!("Checking whether PostgreSQL tables exist");

    let table_query: &str = r#"select table_name from information_schema.tables;"#;

    let rows = sqlx::query(table_query)
        .fetch_all(pg_con_pool)
        .await
        .map_err(|err| {
            error!("Failed to execute query: {}", err);
            anyhow::Error::new(err)
        })?;

    let pg_table_names: Vec<String> = rows.into_iter().map(|row| row.get(0)).collect();
    let all_tables_exist = table_names.iter().all(|table_name| pg_table_names.contains(&table_name.to_string()));

    Ok(all_tables_exist)
}

pub async fn create_tables(pg_con_pool: &PgPool) -> Result<(), anyhow::Error> {
    info!("Creating PostgreSQL tables");

    let create_tables_queries = vec![
        "CREATE TABLE IF NOT EXISTS patients (
            id SERIAL PRIMARY KEY,
            patient_id VARCHAR(100) NOT NULL UNIQUE,
            age INTEGER NOT NULL,
            gender VARCHAR(20) NOT NULL,
            clinical_notes TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS predictions (
            id SERIAL PRIMARY KEY,
            patient_id VARCHAR(100) NOT NULL,
            status VARCHAR(20) NOT NULL,
            has_alzheimer INTEGER,
            confidence_score DOUBLE PRECISION,
            risk_level VARCHAR(20),
            processing_time DOUBLE PRECISION,
            model_version VARCHAR(50),
            result_data JSONB,
            error_message TEXT,
            image_path VARCHAR(500),
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at TIMESTAMPTZ
        )",
        "CREATE INDEX IF NOT EXISTS idx_predictions_patient_id ON predictions (patient_id)",
        "CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions (created_at DESC)",
        "CREATE OR REPLACE FUNCTION update_updated_at()
            RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = CURRENT_TIMESTAMP;
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql;",
        "DROP TRIGGER IF EXISTS update_updated_at_trigger ON patients",
        "CREATE TRIGGER update_updated_at_trigger
            BEFORE UPDATE ON patients
            FOR EACH ROW
            EXECUTE PROCEDURE update_updated_at();",
    ];

    for query in create_tables_queries {
        sqlx::query(query)
            .execute(pg_con_pool)
            .await?;
    }

    Ok(())
}
