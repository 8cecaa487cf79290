//! Thin transactional PostgreSQL adapter.
//!
//! The whole pipeline runs against one connection; every batch method opens
//! its own transaction so a failed batch rolls back without poisoning the
//! run. Schema init drops and recreates the entity tables: each run is a
//! full rebuild of the region.

use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::config::Config;
use crate::error::IngestError;
use crate::models::{AddrObject, House, HouseParamField, LandPlot, ObjectKind, ParamValue};

/// Resolved parent links for one staged house.
#[derive(Debug, Clone)]
pub struct HouseLinks {
    pub object_id: i64,
    pub street_id: Option<i64>,
    pub settlement_id: Option<i64>,
    pub municipality_id: Option<i64>,
}

/// Resolved parent links for one staged land plot.
#[derive(Debug, Clone)]
pub struct PlotLinks {
    pub object_id: i64,
    pub settlement_id: Option<i64>,
    pub municipality_id: Option<i64>,
}

/// Per-ancestor house link counts for the run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct HouseLinkCounts {
    pub total: i64,
    pub with_street: i64,
    pub with_settlement: i64,
    pub with_municipality: i64,
}

pub struct PgStore {
    client: Client,
    schema: String,
}

impl PgStore {
    pub async fn connect(config: &Config) -> Result<Self, IngestError> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{}...",
            config.db_host, config.db_port, config.db_name
        );
        let (client, connection) = tokio_postgres::connect(&config.pg_conn_string(), NoTls).await?;

        // The connection task owns the socket; it ends when the client drops.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            schema: config.db_schema.clone(),
        })
    }

    /// Drop and recreate the five entity tables plus their object_id indexes.
    pub async fn init_schema(&mut self) -> Result<(), IngestError> {
        let s = &self.schema;
        let ddl = format!(
            r#"
            CREATE SCHEMA IF NOT EXISTS {s};

            DROP TABLE IF EXISTS {s}.houses CASCADE;
            DROP TABLE IF EXISTS {s}.land_plots CASCADE;
            DROP TABLE IF EXISTS {s}.streets CASCADE;
            DROP TABLE IF EXISTS {s}.settlements CASCADE;
            DROP TABLE IF EXISTS {s}.municipalities CASCADE;

            CREATE TABLE {s}.municipalities (
                id BIGINT PRIMARY KEY,
                object_id BIGINT UNIQUE NOT NULL,
                object_guid UUID,
                name VARCHAR(250) NOT NULL,
                type_name VARCHAR(50) NOT NULL,
                level VARCHAR(10) NOT NULL,
                parent_id BIGINT,
                is_actual INTEGER DEFAULT 1,
                is_active INTEGER DEFAULT 1,
                update_date DATE
            );

            CREATE TABLE {s}.settlements (
                id BIGINT PRIMARY KEY,
                object_id BIGINT UNIQUE NOT NULL,
                object_guid UUID,
                name VARCHAR(250) NOT NULL,
                type_name VARCHAR(50) NOT NULL,
                level VARCHAR(10) NOT NULL,
                municipality_id BIGINT,
                is_actual INTEGER DEFAULT 1,
                is_active INTEGER DEFAULT 1,
                update_date DATE
            );

            CREATE TABLE {s}.streets (
                id BIGINT PRIMARY KEY,
                object_id BIGINT UNIQUE NOT NULL,
                object_guid UUID,
                name VARCHAR(250) NOT NULL,
                type_name VARCHAR(50) NOT NULL,
                level VARCHAR(10) NOT NULL,
                settlement_id BIGINT,
                municipality_id BIGINT,
                is_actual INTEGER DEFAULT 1,
                is_active INTEGER DEFAULT 1,
                update_date DATE
            );

            CREATE TABLE {s}.houses (
                id BIGINT PRIMARY KEY,
                object_id BIGINT UNIQUE NOT NULL,
                object_guid UUID,
                house_number VARCHAR(50),
                building_number VARCHAR(50),
                structure_number VARCHAR(50),
                street_id BIGINT,
                settlement_id BIGINT,
                municipality_id BIGINT,
                cadastral_number VARCHAR(100),
                floors_count INTEGER,
                residents_count INTEGER,
                full_address TEXT,
                is_actual INTEGER DEFAULT 1,
                is_active INTEGER DEFAULT 1,
                update_date DATE
            );

            CREATE TABLE {s}.land_plots (
                id BIGINT PRIMARY KEY,
                object_id BIGINT UNIQUE NOT NULL,
                object_guid UUID,
                plot_number VARCHAR(250),
                settlement_id BIGINT,
                municipality_id BIGINT,
                is_actual INTEGER DEFAULT 1,
                is_active INTEGER DEFAULT 1,
                update_date DATE
            );

            CREATE INDEX IF NOT EXISTS idx_municipalities_object_id ON {s}.municipalities(object_id);
            CREATE INDEX IF NOT EXISTS idx_settlements_object_id ON {s}.settlements(object_id);
            CREATE INDEX IF NOT EXISTS idx_streets_object_id ON {s}.streets(object_id);
            CREATE INDEX IF NOT EXISTS idx_houses_object_id ON {s}.houses(object_id);
            CREATE INDEX IF NOT EXISTS idx_land_plots_object_id ON {s}.land_plots(object_id);
            "#
        );
        self.client.batch_execute(&ddl).await?;
        info!("Schema {} initialized", s);
        Ok(())
    }

    /// Insert one batch of staged address objects into the table their kind
    /// routes to. Conflicting object_ids are left untouched.
    pub async fn insert_addr_objects(
        &mut self,
        kind: ObjectKind,
        rows: &[AddrObject],
    ) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {}.{} \
             (id, object_id, object_guid, name, type_name, level, is_actual, is_active, update_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (object_id) DO NOTHING",
            self.schema,
            kind.table()
        );

        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut inserted = 0u64;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.id,
                        &row.object_id,
                        &row.object_guid,
                        &row.name,
                        &row.type_name,
                        &row.level,
                        &row.is_actual,
                        &row.is_active,
                        &row.update_date,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn insert_houses(&mut self, rows: &[House]) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {}.houses \
             (id, object_id, object_guid, house_number, building_number, structure_number, \
              is_actual, is_active, update_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (object_id) DO NOTHING",
            self.schema
        );

        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut inserted = 0u64;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.id,
                        &row.object_id,
                        &row.object_guid,
                        &row.house_number,
                        &row.building_number,
                        &row.structure_number,
                        &row.is_actual,
                        &row.is_active,
                        &row.update_date,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn insert_land_plots(&mut self, rows: &[LandPlot]) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {}.land_plots \
             (id, object_id, object_guid, plot_number, is_actual, is_active, update_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (object_id) DO NOTHING",
            self.schema
        );

        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut inserted = 0u64;
        for row in rows {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &row.id,
                        &row.object_id,
                        &row.object_guid,
                        &row.plot_number,
                        &row.is_actual,
                        &row.is_active,
                        &row.update_date,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Batched single-column parent fill, e.g. settlements.municipality_id.
    pub async fn update_parent_column(
        &mut self,
        table: &str,
        column: &str,
        pairs: &[(i64, i64)],
    ) -> Result<u64, IngestError> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {}.{} SET {} = $1 WHERE object_id = $2",
            self.schema, table, column
        );
        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut updated = 0u64;
        for (parent_id, object_id) in pairs {
            updated += tx.execute(&stmt, &[parent_id, object_id]).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn update_house_links(&mut self, rows: &[HouseLinks]) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {}.houses \
             SET street_id = $1, settlement_id = $2, municipality_id = $3 \
             WHERE object_id = $4",
            self.schema
        );
        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut updated = 0u64;
        for row in rows {
            updated += tx
                .execute(
                    &stmt,
                    &[
                        &row.street_id,
                        &row.settlement_id,
                        &row.municipality_id,
                        &row.object_id,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn update_plot_links(&mut self, rows: &[PlotLinks]) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {}.land_plots \
             SET settlement_id = $1, municipality_id = $2 \
             WHERE object_id = $3",
            self.schema
        );
        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;
        let mut updated = 0u64;
        for row in rows {
            updated += tx
                .execute(
                    &stmt,
                    &[&row.settlement_id, &row.municipality_id, &row.object_id],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Streets inherit their settlement's municipality in one statement.
    pub async fn link_streets_to_municipalities(&mut self) -> Result<u64, IngestError> {
        let sql = streets_to_municipalities_sql(&self.schema);
        Ok(self.client.execute(&sql, &[]).await?)
    }

    /// Through-street fill: houses of a street with a known municipality.
    pub async fn fill_house_municipality_via_street(&mut self) -> Result<u64, IngestError> {
        let sql = house_municipality_via_street_sql(&self.schema);
        Ok(self.client.execute(&sql, &[]).await?)
    }

    /// Through-settlement fill for houses.
    pub async fn fill_house_municipality_via_settlement(&mut self) -> Result<u64, IngestError> {
        let sql = house_municipality_via_settlement_sql(&self.schema);
        Ok(self.client.execute(&sql, &[]).await?)
    }

    /// Through-settlement fill for land plots.
    pub async fn fill_plot_municipality_via_settlement(&mut self) -> Result<u64, IngestError> {
        let sql = plot_municipality_via_settlement_sql(&self.schema);
        Ok(self.client.execute(&sql, &[]).await?)
    }

    /// Compose `full_address` for every house with all three ancestors.
    pub async fn compose_full_addresses(&mut self) -> Result<u64, IngestError> {
        let sql = compose_full_addresses_sql(&self.schema);
        Ok(self.client.execute(&sql, &[]).await?)
    }

    /// Apply one validated house parameter. Autocommitted: parameter density
    /// is low relative to houses, so per-row writes keep the pass simple.
    pub async fn apply_house_param(
        &mut self,
        field: HouseParamField,
        value: &ParamValue,
        object_id: i64,
    ) -> Result<u64, IngestError> {
        let sql = format!(
            "UPDATE {}.houses SET {} = $1 WHERE object_id = $2",
            self.schema,
            field.column()
        );
        let updated = match value {
            ParamValue::Text(text) => self.client.execute(&sql, &[text, &object_id]).await?,
            ParamValue::Count(count) => self.client.execute(&sql, &[count, &object_id]).await?,
        };
        Ok(updated)
    }

    pub async fn object_ids(&mut self, table: &str) -> Result<Vec<i64>, IngestError> {
        let sql = format!("SELECT object_id FROM {}.{}", self.schema, table);
        let rows = self.client.query(&sql, &[]).await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Houses still missing a municipality, bounded for the residual pass.
    pub async fn house_ids_missing_municipality(
        &mut self,
        limit: i64,
    ) -> Result<Vec<i64>, IngestError> {
        let sql = format!(
            "SELECT object_id FROM {}.houses WHERE municipality_id IS NULL LIMIT $1",
            self.schema
        );
        let rows = self.client.query(&sql, &[&limit]).await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    pub async fn table_count(&mut self, table: &str) -> Result<i64, IngestError> {
        let sql = format!("SELECT COUNT(*) FROM {}.{}", self.schema, table);
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }

    pub async fn house_link_counts(&mut self) -> Result<HouseLinkCounts, IngestError> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(street_id), COUNT(settlement_id), COUNT(municipality_id) \
             FROM {}.houses",
            self.schema
        );
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(HouseLinkCounts {
            total: row.get(0),
            with_street: row.get(1),
            with_settlement: row.get(2),
            with_municipality: row.get(3),
        })
    }

    pub async fn house_param_count(&mut self, field: HouseParamField) -> Result<i64, IngestError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.houses WHERE {} IS NOT NULL",
            self.schema,
            field.column()
        );
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}

// The set-based statements are the load-bearing SQL of the run; building
// them as pure functions keeps their text assertable without a database.

fn streets_to_municipalities_sql(schema: &str) -> String {
    format!(
        "UPDATE {s}.streets \
         SET municipality_id = stl.municipality_id \
         FROM {s}.settlements stl \
         WHERE streets.settlement_id = stl.object_id \
         AND stl.municipality_id IS NOT NULL",
        s = schema
    )
}

fn house_municipality_via_street_sql(schema: &str) -> String {
    format!(
        "UPDATE {s}.houses h \
         SET municipality_id = st.municipality_id \
         FROM {s}.streets st \
         WHERE h.street_id = st.object_id \
         AND st.municipality_id IS NOT NULL \
         AND h.municipality_id IS NULL",
        s = schema
    )
}

fn house_municipality_via_settlement_sql(schema: &str) -> String {
    format!(
        "UPDATE {s}.houses h \
         SET municipality_id = stl.municipality_id \
         FROM {s}.settlements stl \
         WHERE h.settlement_id = stl.object_id \
         AND stl.municipality_id IS NOT NULL \
         AND h.municipality_id IS NULL",
        s = schema
    )
}

fn plot_municipality_via_settlement_sql(schema: &str) -> String {
    format!(
        "UPDATE {s}.land_plots lp \
         SET municipality_id = stl.municipality_id \
         FROM {s}.settlements stl \
         WHERE lp.settlement_id = stl.object_id \
         AND stl.municipality_id IS NOT NULL \
         AND lp.municipality_id IS NULL",
        s = schema
    )
}

fn compose_full_addresses_sql(schema: &str) -> String {
    format!(
        "UPDATE {s}.houses h \
         SET full_address = TRIM(CONCAT_WS(', ', \
             m.name, \
             CASE WHEN stl.name IS NOT NULL THEN stl.type_name || ' ' || stl.name END, \
             CASE WHEN st.name IS NOT NULL THEN st.type_name || ' ' || st.name END, \
             CASE WHEN h.house_number IS NOT NULL THEN 'д. ' || h.house_number END, \
             CASE WHEN h.building_number IS NOT NULL THEN 'к. ' || h.building_number END, \
             CASE WHEN h.structure_number IS NOT NULL THEN 'стр. ' || h.structure_number END \
         )) \
         FROM {s}.municipalities m, {s}.settlements stl, {s}.streets st \
         WHERE h.municipality_id = m.object_id \
         AND h.settlement_id = stl.object_id \
         AND h.street_id = st.object_id",
        s = schema
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Downstream deployments point monitoring at these exact statements;
    // their text must stay stable across refactors.

    #[test]
    fn streets_to_municipalities_statement_is_stable() {
        assert_eq!(
            streets_to_municipalities_sql("gar"),
            "UPDATE gar.streets \
             SET municipality_id = stl.municipality_id \
             FROM gar.settlements stl \
             WHERE streets.settlement_id = stl.object_id \
             AND stl.municipality_id IS NOT NULL"
        );
    }

    #[test]
    fn through_street_fill_statement_is_stable() {
        assert_eq!(
            house_municipality_via_street_sql("gar"),
            "UPDATE gar.houses h \
             SET municipality_id = st.municipality_id \
             FROM gar.streets st \
             WHERE h.street_id = st.object_id \
             AND st.municipality_id IS NOT NULL \
             AND h.municipality_id IS NULL"
        );
    }

    #[test]
    fn through_settlement_fill_statements_are_stable() {
        assert_eq!(
            house_municipality_via_settlement_sql("gar"),
            "UPDATE gar.houses h \
             SET municipality_id = stl.municipality_id \
             FROM gar.settlements stl \
             WHERE h.settlement_id = stl.object_id \
             AND stl.municipality_id IS NOT NULL \
             AND h.municipality_id IS NULL"
        );
        assert_eq!(
            plot_municipality_via_settlement_sql("gar"),
            "UPDATE gar.land_plots lp \
             SET municipality_id = stl.municipality_id \
             FROM gar.settlements stl \
             WHERE lp.settlement_id = stl.object_id \
             AND stl.municipality_id IS NOT NULL \
             AND lp.municipality_id IS NULL"
        );
    }

    #[test]
    fn compose_full_addresses_statement_is_stable() {
        assert_eq!(
            compose_full_addresses_sql("gar"),
            "UPDATE gar.houses h \
             SET full_address = TRIM(CONCAT_WS(', ', \
                 m.name, \
                 CASE WHEN stl.name IS NOT NULL THEN stl.type_name || ' ' || stl.name END, \
                 CASE WHEN st.name IS NOT NULL THEN st.type_name || ' ' || st.name END, \
                 CASE WHEN h.house_number IS NOT NULL THEN 'д. ' || h.house_number END, \
                 CASE WHEN h.building_number IS NOT NULL THEN 'к. ' || h.building_number END, \
                 CASE WHEN h.structure_number IS NOT NULL THEN 'стр. ' || h.structure_number END \
             )) \
             FROM gar.municipalities m, gar.settlements stl, gar.streets st \
             WHERE h.municipality_id = m.object_id \
             AND h.settlement_id = stl.object_id \
             AND h.street_id = st.object_id"
        );
    }

    #[test]
    fn schema_name_is_interpolated_everywhere() {
        for sql in [
            streets_to_municipalities_sql("other"),
            house_municipality_via_street_sql("other"),
            house_municipality_via_settlement_sql("other"),
            plot_municipality_via_settlement_sql("other"),
            compose_full_addresses_sql("other"),
        ] {
            assert!(sql.contains("other."), "missing schema prefix in: {sql}");
            assert!(!sql.contains("gar."), "stray schema name in: {sql}");
        }
    }
}
