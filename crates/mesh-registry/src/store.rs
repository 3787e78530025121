//! Persistent registry store backed by embedded sqlite.
//!
//! The store owns the canonical entities: agents, capabilities, health
//! history, the append-only event log, and the service-contract schema. All
//! writes run in a single transaction. A `schema_version` singleton drives
//! forward-only migrations applied transactionally on open.

use chrono::{DateTime, SecondsFormat, Utc};
use mesh_kernel::{
    AgentRegistration, AgentStatus, Capability, MethodMetadata, MethodParameter, RegistryEvent,
    ServiceContract, Stability,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};

/// Latest schema version; bump together with a new entry in `migrations()`.
const SCHEMA_VERSION: i64 = 1;

/// Maximum pooled connections to the embedded database.
const MAX_CONNECTIONS: u32 = 10;

fn to_ts(ts: DateTime<Utc>) -> String {
    // Fixed-width UTC format so string comparison equals time comparison.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> RegistryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RegistryError::Store(format!("invalid timestamp '{raw}': {e}")))
}

fn to_json<T: Serialize>(value: &T) -> RegistryResult<String> {
    serde_json::to_string(value).map_err(|e| RegistryError::Store(e.to_string()))
}

fn from_json<T: DeserializeOwned>(raw: &str) -> RegistryResult<T> {
    serde_json::from_str(raw).map_err(|e| RegistryError::Store(format!("corrupt column: {e}")))
}

/// Row counts reported by the service health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub agents: i64,
    pub capabilities: i64,
    pub events: i64,
}

/// Sqlite-backed persistent store for the registry.
pub struct RegistryStore {
    pool: SqlitePool,
}

impl RegistryStore {
    /// Open (or create) the database at `path` and apply migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let url = format!("sqlite://{}", path.as_ref().display());
        Self::open_url(&url, MAX_CONNECTIONS).await
    }

    /// Open an in-memory database; used by tests.
    ///
    /// Pool size is pinned to one: every pooled `:memory:` connection would
    /// otherwise get its own empty database.
    pub async fn open_in_memory() -> RegistryResult<Self> {
        Self::open_url("sqlite::memory:", 1).await
    }

    async fn open_url(url: &str, max_connections: u32) -> RegistryResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| RegistryError::Store(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Apply forward-only migrations inside a single transaction.
    async fn migrate(&self) -> RegistryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&mut *tx)
        .await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.unwrap_or(0);

        if current > SCHEMA_VERSION {
            return Err(RegistryError::Store(format!(
                "database schema version {current} is newer than supported {SCHEMA_VERSION}"
            )));
        }

        for (version, statements) in migrations() {
            if version <= current {
                continue;
            }
            debug!(version, "applying schema migration");
            for statement in statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(to_ts(Utc::now()))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        if current < SCHEMA_VERSION {
            info!(from = current, to = SCHEMA_VERSION, "registry schema migrated");
        }
        Ok(())
    }

    /// Register or update an agent, replacing its capability set.
    pub async fn register_agent(&self, agent: &AgentRegistration) -> RegistryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO agents (
                id, name, namespace, endpoint, status, labels, annotations,
                created_at, updated_at, resource_version, last_heartbeat,
                health_interval, timeout_threshold, eviction_threshold,
                agent_type, config, security_context, dependencies
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                namespace = excluded.namespace,
                endpoint = excluded.endpoint,
                status = excluded.status,
                labels = excluded.labels,
                annotations = excluded.annotations,
                updated_at = excluded.updated_at,
                resource_version = excluded.resource_version,
                last_heartbeat = excluded.last_heartbeat,
                health_interval = excluded.health_interval,
                timeout_threshold = excluded.timeout_threshold,
                eviction_threshold = excluded.eviction_threshold,
                agent_type = excluded.agent_type,
                config = excluded.config,
                security_context = excluded.security_context,
                dependencies = excluded.dependencies",
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.namespace)
        .bind(&agent.endpoint)
        .bind(agent.status.to_string())
        .bind(to_json(&agent.labels)?)
        .bind(to_json(&agent.annotations)?)
        .bind(to_ts(agent.created_at))
        .bind(to_ts(agent.updated_at))
        .bind(&agent.resource_version)
        .bind(agent.last_heartbeat.map(to_ts))
        .bind(agent.health_interval as i64)
        .bind(agent.timeout_threshold as i64)
        .bind(agent.eviction_threshold as i64)
        .bind(&agent.agent_type)
        .bind(to_json(&agent.config)?)
        .bind(&agent.security_context)
        .bind(to_json(&agent.dependencies)?)
        .execute(&mut *tx)
        .await?;

        // Replace the capability set wholesale; it is small per agent.
        sqlx::query("DELETE FROM capabilities WHERE agent_id = ?")
            .bind(&agent.id)
            .execute(&mut *tx)
            .await?;

        for cap in &agent.capabilities {
            sqlx::query(
                "INSERT INTO capabilities (
                    agent_id, name, description, version, category, stability,
                    tags, parameters_schema, security_requirements,
                    performance_metrics, resource_requirements, metadata
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&agent.id)
            .bind(&cap.name)
            .bind(&cap.description)
            .bind(&cap.version)
            .bind(&cap.category)
            .bind(cap.stability.to_string())
            .bind(to_json(&cap.tags)?)
            .bind(cap.parameters_schema.as_ref().map(to_json).transpose()?)
            .bind(to_json(&cap.security_requirements)?)
            .bind(to_json(&cap.performance_metrics)?)
            .bind(to_json(&cap.resource_requirements)?)
            .bind(to_json(&cap.metadata)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove an agent; capabilities, health rows, and contracts cascade.
    pub async fn unregister_agent(&self, agent_id: &str) -> RegistryResult<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_agent(&self, agent_id: &str) -> RegistryResult<Option<AgentRegistration>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut agent = row_to_agent(&row)?;
                agent.capabilities = self.capabilities_for(agent_id).await?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    /// All agents with their capabilities, ordered by id.
    pub async fn list_agents(&self) -> RegistryResult<Vec<AgentRegistration>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut agent = row_to_agent(row)?;
            agent.capabilities = self.capabilities_for(&agent.id).await?;
            agents.push(agent);
        }
        Ok(agents)
    }

    async fn capabilities_for(&self, agent_id: &str) -> RegistryResult<Vec<Capability>> {
        let rows = sqlx::query("SELECT * FROM capabilities WHERE agent_id = ? ORDER BY name")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_capability).collect()
    }

    /// Stamp a heartbeat: timestamp, healthy status, and a new version.
    /// Returns false when the agent is unknown.
    pub async fn update_heartbeat(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
        resource_version: &str,
    ) -> RegistryResult<bool> {
        let result = sqlx::query(
            "UPDATE agents
             SET last_heartbeat = ?, status = 'healthy', updated_at = ?, resource_version = ?
             WHERE id = ?",
        )
        .bind(to_ts(at))
        .bind(to_ts(at))
        .bind(resource_version)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of agents whose last heartbeat is older than `cutoff`.
    pub async fn unhealthy_agents(&self, cutoff: DateTime<Utc>) -> RegistryResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM agents WHERE last_heartbeat IS NOT NULL AND last_heartbeat < ?",
        )
        .bind(to_ts(cutoff))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Batch status update; returns the number of rows touched.
    pub async fn mark_agents_status(
        &self,
        agent_ids: &[String],
        status: AgentStatus,
        at: DateTime<Utc>,
        resource_version: &str,
    ) -> RegistryResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut touched = 0;
        for id in agent_ids {
            let result = sqlx::query(
                "UPDATE agents SET status = ?, updated_at = ?, resource_version = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(to_ts(at))
            .bind(resource_version)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            touched += result.rows_affected();
        }
        tx.commit().await?;
        Ok(touched)
    }

    /// Append a row to the per-agent health history.
    pub async fn record_health_event(
        &self,
        agent_id: &str,
        status: AgentStatus,
        source: &str,
        at: DateTime<Utc>,
    ) -> RegistryResult<()> {
        sqlx::query(
            "INSERT INTO agent_health (agent_id, status, timestamp, source) VALUES (?, ?, ?, ?)",
        )
        .bind(agent_id)
        .bind(status.to_string())
        .bind(to_ts(at))
        .bind(source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append to the registry change log.
    pub async fn append_event(&self, event: &RegistryEvent) -> RegistryResult<()> {
        sqlx::query(
            "INSERT INTO registry_events (event_type, agent_id, timestamp, resource_version, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.event_type.to_string())
        .bind(&event.agent_id)
        .bind(to_ts(event.timestamp))
        .bind(&event.resource_version)
        .bind(to_json(&event.object)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store a service contract and its methods for an agent, replacing any
    /// previous contract with the same service name and version.
    pub async fn store_contract(
        &self,
        agent_id: &str,
        contract: &ServiceContract,
    ) -> RegistryResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = to_ts(Utc::now());

        sqlx::query(
            "DELETE FROM service_contracts
             WHERE agent_id = ? AND service_name = ? AND service_version = ?",
        )
        .bind(agent_id)
        .bind(&contract.service_name)
        .bind(&contract.service_version)
        .execute(&mut *tx)
        .await?;

        let contract_id: i64 = sqlx::query_scalar(
            "INSERT INTO service_contracts (
                agent_id, service_name, service_version, description,
                contract_version, compatibility_level, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(agent_id)
        .bind(&contract.service_name)
        .bind(&contract.service_version)
        .bind(&contract.description)
        .bind(&contract.contract_version)
        .bind(to_json(&contract.compatibility_level)?.trim_matches('"').to_string())
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        for method in &contract.methods {
            let method_id: i64 = sqlx::query_scalar(
                "INSERT INTO method_metadata (
                    contract_id, method_name, return_type, is_async, method_type,
                    docstring, stability_level, deprecation_warning,
                    expected_complexity, timeout_hint, resource_requirements,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id",
            )
            .bind(contract_id)
            .bind(&method.method_name)
            .bind(&method.return_type)
            .bind(method.is_async)
            .bind(method.method_type.to_string())
            .bind(&method.docstring)
            .bind(&method.stability_level)
            .bind(&method.deprecation_warning)
            .bind(&method.expected_complexity)
            .bind(method.timeout_hint as i64)
            .bind(to_json(&method.resource_requirements)?)
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await?;

            for param in &method.parameters {
                sqlx::query(
                    "INSERT INTO method_parameters (
                        method_id, parameter_name, parameter_type, parameter_kind,
                        default_value, has_default, is_optional, position
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(method_id)
                .bind(&param.name)
                .bind(&param.type_tag)
                .bind(&param.kind)
                .bind(param.default_value.as_ref().map(to_json).transpose()?)
                .bind(param.default_value.is_some())
                .bind(param.is_optional)
                .bind(param.position as i64)
                .execute(&mut *tx)
                .await?;
            }

            for capability in &method.capabilities {
                sqlx::query(
                    "INSERT INTO method_capabilities (method_id, capability_name) VALUES (?, ?)",
                )
                .bind(method_id)
                .bind(capability)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load the latest stored contract for `(agent_id, service_name)`.
    pub async fn get_contract(
        &self,
        agent_id: &str,
        service_name: &str,
    ) -> RegistryResult<Option<ServiceContract>> {
        let row = sqlx::query(
            "SELECT * FROM service_contracts
             WHERE agent_id = ? AND service_name = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(agent_id)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let contract_id: i64 = row.get("id");
        let mut contract = ServiceContract::new(row.get::<String, _>("service_name"));
        contract.service_version = row.get("service_version");
        contract.description = row.get("description");
        contract.contract_version = row.get("contract_version");
        contract.compatibility_level =
            from_json(&format!("\"{}\"", row.get::<String, _>("compatibility_level")))?;

        let method_rows =
            sqlx::query("SELECT * FROM method_metadata WHERE contract_id = ? ORDER BY id")
                .bind(contract_id)
                .fetch_all(&self.pool)
                .await?;

        for method_row in &method_rows {
            let method_id: i64 = method_row.get("id");
            let mut method = MethodMetadata::new(method_row.get::<String, _>("method_name"));
            method.return_type = method_row.get("return_type");
            method.is_async = method_row.get("is_async");
            method.method_type =
                from_json(&format!("\"{}\"", method_row.get::<String, _>("method_type")))?;
            method.docstring = method_row.get("docstring");
            method.stability_level = method_row.get("stability_level");
            method.deprecation_warning = method_row.get("deprecation_warning");
            method.expected_complexity = method_row.get("expected_complexity");
            method.timeout_hint = method_row.get::<i64, _>("timeout_hint") as u64;
            method.resource_requirements =
                from_json(&method_row.get::<String, _>("resource_requirements"))?;

            let param_rows = sqlx::query(
                "SELECT * FROM method_parameters WHERE method_id = ? ORDER BY position",
            )
            .bind(method_id)
            .fetch_all(&self.pool)
            .await?;
            for p in &param_rows {
                method.parameters.push(MethodParameter {
                    name: p.get("parameter_name"),
                    type_tag: p.get("parameter_type"),
                    kind: p.get("parameter_kind"),
                    default_value: p
                        .get::<Option<String>, _>("default_value")
                        .map(|raw| from_json(&raw))
                        .transpose()?,
                    is_optional: p.get("is_optional"),
                    position: p.get::<i64, _>("position") as u32,
                });
            }

            method.capabilities = sqlx::query_scalar(
                "SELECT capability_name FROM method_capabilities WHERE method_id = ? ORDER BY id",
            )
            .bind(method_id)
            .fetch_all(&self.pool)
            .await?;

            contract.methods.push(method);
        }

        Ok(Some(contract))
    }

    /// `(agent_id, service_name)` pairs whose methods provide a capability.
    pub async fn find_contracts_by_capability(
        &self,
        capability_name: &str,
    ) -> RegistryResult<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT sc.agent_id, sc.service_name
             FROM service_contracts sc
             JOIN method_metadata mm ON mm.contract_id = sc.id
             JOIN method_capabilities mc ON mc.method_id = mm.id
             WHERE mc.capability_name = ?
             ORDER BY sc.agent_id",
        )
        .bind(capability_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("agent_id"), r.get("service_name")))
            .collect())
    }

    /// Lightweight liveness probe used by the service health endpoint.
    pub async fn stats(&self) -> RegistryResult<StoreStats> {
        let agents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents")
            .fetch_one(&self.pool)
            .await?;
        let capabilities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM capabilities")
            .fetch_one(&self.pool)
            .await?;
        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registry_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats { agents, capabilities, events })
    }
}

fn row_to_agent(row: &SqliteRow) -> RegistryResult<AgentRegistration> {
    let status: String = row.get("status");
    let status = status
        .parse::<AgentStatus>()
        .map_err(RegistryError::Store)?;

    Ok(AgentRegistration {
        id: row.get("id"),
        name: row.get("name"),
        namespace: row.get("namespace"),
        endpoint: row.get("endpoint"),
        status,
        labels: from_json(&row.get::<String, _>("labels"))?,
        annotations: from_json(&row.get::<String, _>("annotations"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        resource_version: row.get("resource_version"),
        last_heartbeat: row
            .get::<Option<String>, _>("last_heartbeat")
            .map(|raw| parse_ts(&raw))
            .transpose()?,
        health_interval: row.get::<i64, _>("health_interval") as u64,
        timeout_threshold: row.get::<i64, _>("timeout_threshold") as u64,
        eviction_threshold: row.get::<i64, _>("eviction_threshold") as u64,
        agent_type: row.get("agent_type"),
        config: from_json(&row.get::<String, _>("config"))?,
        security_context: row.get("security_context"),
        dependencies: from_json(&row.get::<String, _>("dependencies"))?,
        capabilities: Vec::new(),
    })
}

fn row_to_capability(row: &SqliteRow) -> RegistryResult<Capability> {
    let stability: String = row.get("stability");
    let stability: Stability = from_json(&format!("\"{stability}\""))?;

    Ok(Capability {
        name: row.get("name"),
        version: row.get("version"),
        description: row.get("description"),
        category: row.get("category"),
        stability,
        tags: from_json(&row.get::<String, _>("tags"))?,
        parameters_schema: row
            .get::<Option<String>, _>("parameters_schema")
            .map(|raw| from_json(&raw))
            .transpose()?,
        security_requirements: from_json(&row.get::<String, _>("security_requirements"))?,
        performance_metrics: from_json(&row.get::<String, _>("performance_metrics"))?,
        resource_requirements: from_json(&row.get::<String, _>("resource_requirements"))?,
        metadata: from_json(&row.get::<String, _>("metadata"))?,
    })
}

/// Ordered migration list; each entry is `(version, statements)`.
fn migrations() -> Vec<(i64, Vec<&'static str>)> {
    vec![(
        1,
        vec![
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                namespace TEXT NOT NULL DEFAULT 'default',
                endpoint TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                labels TEXT NOT NULL DEFAULT '{}',
                annotations TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resource_version TEXT NOT NULL,
                last_heartbeat TEXT,
                health_interval INTEGER NOT NULL DEFAULT 30,
                timeout_threshold INTEGER NOT NULL DEFAULT 60,
                eviction_threshold INTEGER NOT NULL DEFAULT 120,
                agent_type TEXT NOT NULL DEFAULT 'mesh-agent',
                config TEXT NOT NULL DEFAULT '{}',
                security_context TEXT,
                dependencies TEXT NOT NULL DEFAULT '[]',
                UNIQUE(name, namespace)
            )",
            "CREATE TABLE IF NOT EXISTS capabilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                version TEXT NOT NULL DEFAULT '1.0.0',
                category TEXT NOT NULL DEFAULT '',
                stability TEXT NOT NULL DEFAULT 'stable',
                tags TEXT NOT NULL DEFAULT '[]',
                parameters_schema TEXT,
                security_requirements TEXT NOT NULL DEFAULT '[]',
                performance_metrics TEXT NOT NULL DEFAULT '{}',
                resource_requirements TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE,
                UNIQUE(agent_id, name)
            )",
            "CREATE TABLE IF NOT EXISTS agent_health (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'registry',
                FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE
            )",
            "CREATE TABLE IF NOT EXISTS registry_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                resource_version TEXT NOT NULL,
                data TEXT
            )",
            "CREATE TABLE IF NOT EXISTS service_contracts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                service_name TEXT NOT NULL,
                service_version TEXT NOT NULL DEFAULT '1.0.0',
                description TEXT NOT NULL DEFAULT '',
                contract_version TEXT NOT NULL DEFAULT '1.0.0',
                compatibility_level TEXT NOT NULL DEFAULT 'strict',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE,
                UNIQUE(agent_id, service_name, service_version)
            )",
            "CREATE TABLE IF NOT EXISTS method_metadata (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contract_id INTEGER NOT NULL,
                method_name TEXT NOT NULL,
                return_type TEXT NOT NULL DEFAULT '',
                is_async INTEGER NOT NULL DEFAULT 0,
                method_type TEXT NOT NULL DEFAULT 'function',
                docstring TEXT NOT NULL DEFAULT '',
                stability_level TEXT NOT NULL DEFAULT 'stable',
                deprecation_warning TEXT NOT NULL DEFAULT '',
                expected_complexity TEXT NOT NULL DEFAULT 'O(1)',
                timeout_hint INTEGER NOT NULL DEFAULT 30,
                resource_requirements TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (contract_id) REFERENCES service_contracts(id) ON DELETE CASCADE,
                UNIQUE(contract_id, method_name)
            )",
            "CREATE TABLE IF NOT EXISTS method_parameters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                method_id INTEGER NOT NULL,
                parameter_name TEXT NOT NULL,
                parameter_type TEXT NOT NULL,
                parameter_kind TEXT NOT NULL,
                default_value TEXT,
                has_default INTEGER NOT NULL DEFAULT 0,
                is_optional INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL,
                FOREIGN KEY (method_id) REFERENCES method_metadata(id) ON DELETE CASCADE,
                UNIQUE(method_id, parameter_name)
            )",
            "CREATE TABLE IF NOT EXISTS method_capabilities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                method_id INTEGER NOT NULL,
                capability_name TEXT NOT NULL,
                FOREIGN KEY (method_id) REFERENCES method_metadata(id) ON DELETE CASCADE,
                UNIQUE(method_id, capability_name)
            )",
            "CREATE TABLE IF NOT EXISTS capability_method_mapping (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                capability_id INTEGER NOT NULL,
                method_id INTEGER NOT NULL,
                mapping_type TEXT NOT NULL DEFAULT 'direct',
                priority INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (capability_id) REFERENCES capabilities(id) ON DELETE CASCADE,
                FOREIGN KEY (method_id) REFERENCES method_metadata(id) ON DELETE CASCADE,
                UNIQUE(capability_id, method_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_agents_namespace ON agents(namespace)",
            "CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status)",
            "CREATE INDEX IF NOT EXISTS idx_agents_updated ON agents(updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_agents_heartbeat ON agents(last_heartbeat)",
            "CREATE INDEX IF NOT EXISTS idx_capabilities_composite ON capabilities(name, agent_id)",
            "CREATE INDEX IF NOT EXISTS idx_health_status ON agent_health(agent_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_events_type ON registry_events(event_type, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_contracts_composite ON service_contracts(agent_id, service_name)",
            "CREATE INDEX IF NOT EXISTS idx_method_caps_composite ON method_capabilities(capability_name, method_id)",
        ],
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::EventType;

    fn sample_agent(id: &str) -> AgentRegistration {
        let mut agent = AgentRegistration::new(id, id, format!("http://localhost:0/{id}"));
        agent.resource_version = "00000000000000000001".to_string();
        let mut cap = Capability::new("greeting");
        cap.tags.insert("demo".to_string());
        agent.capabilities.push(cap);
        agent
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        let agent = sample_agent("hello");
        store.register_agent(&agent).await.unwrap();

        let loaded = store.get_agent("hello").await.unwrap().unwrap();
        assert_eq!(loaded.name, "hello");
        assert_eq!(loaded.capabilities.len(), 1);
        assert_eq!(loaded.capabilities[0].name, "greeting");
        assert!(loaded.capabilities[0].tags.contains("demo"));
    }

    #[tokio::test]
    async fn reregistering_is_an_upsert() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        let mut agent = sample_agent("hello");
        store.register_agent(&agent).await.unwrap();

        agent.resource_version = "00000000000000000002".to_string();
        agent.capabilities = vec![Capability::new("farewell")];
        store.register_agent(&agent).await.unwrap();

        let all = store.list_agents().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].resource_version, "00000000000000000002");
        assert_eq!(all[0].capabilities[0].name, "farewell");
    }

    #[tokio::test]
    async fn unregister_cascades_capabilities() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        store.register_agent(&sample_agent("hello")).await.unwrap();

        assert!(store.unregister_agent("hello").await.unwrap());
        assert!(!store.unregister_agent("hello").await.unwrap());
        assert_eq!(store.stats().await.unwrap().capabilities, 0);
    }

    #[tokio::test]
    async fn heartbeat_updates_status_and_version() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        store.register_agent(&sample_agent("hello")).await.unwrap();

        let now = Utc::now();
        let ok = store
            .update_heartbeat("hello", now, "00000000000000000009")
            .await
            .unwrap();
        assert!(ok);

        let agent = store.get_agent("hello").await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Healthy);
        assert_eq!(agent.resource_version, "00000000000000000009");
        assert!(agent.last_heartbeat.is_some());

        let missing = store
            .update_heartbeat("ghost", now, "00000000000000000010")
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn unhealthy_cutoff_selects_stale_agents() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        store.register_agent(&sample_agent("stale")).await.unwrap();
        store.register_agent(&sample_agent("fresh")).await.unwrap();

        let now = Utc::now();
        store
            .update_heartbeat("stale", now - chrono::Duration::seconds(120), "1")
            .await
            .unwrap();
        store.update_heartbeat("fresh", now, "2").await.unwrap();

        let stale = store
            .unhealthy_agents(now - chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(stale, vec!["stale".to_string()]);
    }

    #[tokio::test]
    async fn events_append_to_the_log() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        let event = RegistryEvent {
            event_type: EventType::Added,
            agent_id: "hello".to_string(),
            resource_version: "1".to_string(),
            object: serde_json::json!({"id": "hello"}),
            timestamp: Utc::now(),
        };
        store.append_event(&event).await.unwrap();
        assert_eq!(store.stats().await.unwrap().events, 1);
    }

    #[tokio::test]
    async fn contracts_round_trip() {
        let store = RegistryStore::open_in_memory().await.unwrap();
        store.register_agent(&sample_agent("hello")).await.unwrap();

        let mut contract = ServiceContract::new("greeter");
        let mut method = MethodMetadata::new("greet");
        method.is_async = true;
        method.capabilities = vec!["greeting".to_string()];
        method.parameters.push(MethodParameter {
            name: "name".to_string(),
            type_tag: "str".to_string(),
            kind: "positional".to_string(),
            default_value: Some(serde_json::json!("world")),
            is_optional: true,
            position: 0,
        });
        contract.methods.push(method);

        store.store_contract("hello", &contract).await.unwrap();

        let loaded = store.get_contract("hello", "greeter").await.unwrap().unwrap();
        assert_eq!(loaded.methods.len(), 1);
        assert!(loaded.methods[0].is_async);
        assert_eq!(loaded.methods[0].parameters[0].name, "name");

        let providers = store.find_contracts_by_capability("greeting").await.unwrap();
        assert_eq!(providers, vec![("hello".to_string(), "greeter".to_string())]);
    }
}
