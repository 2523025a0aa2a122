use super::*;
use crate::types::DUPLICATE_VIEW;
use chrono::Utc;
use quad_core::{ConnectionProfile, CredentialCipher, Error};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    connections: Vec<ConnectionProfile>,
    queries: Vec<SavedQuery>,
    views: Vec<SavedTableView>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn connection(&self, id: i64) -> Option<&ConnectionProfile> {
        self.connections.iter().find(|c| c.id == id)
    }

    fn connection_name(&self, id: i64) -> Option<String> {
        self.connection(id).map(|c| c.name.clone())
    }

    fn require_connection(&self, id: i64) -> Result<()> {
        match self.connection(id) {
            Some(_) => Ok(()),
            None => Err(Error::validation(format!("Connection {} does not exist", id))),
        }
    }

    fn with_connection_name(&self, view: &SavedTableView) -> SavedTableView {
        SavedTableView {
            connection_name: self.connection_name(view.connection_id),
            ..view.clone()
        }
    }
}

/// Process-local store for tests and demo mode.
///
/// Passwords go through the same cipher as the PostgreSQL store.
pub struct InMemoryStore {
    cipher: Arc<CredentialCipher>,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(cipher: Arc<CredentialCipher>) -> Self {
        Self {
            cipher,
            state: RwLock::new(State::default()),
        }
    }

    #[cfg(test)]
    pub(crate) async fn stored_password(&self, id: i64) -> Option<String> {
        let state = self.state.read().await;
        state.connection(id).map(|c| c.password_encrypted.clone())
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn create(&self, input: &ConnectionInput) -> Result<ConnectionSummary> {
        let (fields, password) = input.for_create()?;
        let password_encrypted = self.cipher.encrypt(password)?;

        let mut state = self.state.write().await;
        let now = Utc::now();
        let profile = ConnectionProfile {
            id: state.next_id(),
            name: fields.name,
            host: fields.host,
            port: fields.port,
            database_name: fields.database_name,
            username: fields.username,
            password_encrypted,
            is_active: fields.is_active,
            created_at: now,
            updated_at: now,
        };
        let summary = ConnectionSummary::from(&profile);
        state.connections.push(profile);
        Ok(summary)
    }

    async fn update(&self, id: i64, input: &ConnectionInput) -> Result<ConnectionSummary> {
        let fields = input.for_update()?;
        let password_encrypted = match input.new_password() {
            Some(password) => Some(self.cipher.encrypt(password)?),
            None => None,
        };

        let mut state = self.state.write().await;
        let profile = state
            .connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| connection_not_found(id))?;

        profile.name = fields.name;
        profile.host = fields.host;
        profile.port = fields.port;
        profile.database_name = fields.database_name;
        profile.username = fields.username;
        profile.is_active = fields.is_active;
        if let Some(password_encrypted) = password_encrypted {
            profile.password_encrypted = password_encrypted;
        }
        profile.updated_at = Utc::now();

        Ok(ConnectionSummary::from(&*profile))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.connections.len();
        state.connections.retain(|c| c.id != id);
        if state.connections.len() == before {
            return Err(connection_not_found(id));
        }

        state.queries.retain(|q| q.connection_id != id);
        state.views.retain(|v| v.connection_id != id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConnectionSummary>> {
        let state = self.state.read().await;
        let mut summaries: Vec<ConnectionSummary> =
            state.connections.iter().map(ConnectionSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn get(&self, id: i64) -> Result<ConnectionSummary> {
        let state = self.state.read().await;
        state
            .connection(id)
            .map(ConnectionSummary::from)
            .ok_or_else(|| connection_not_found(id))
    }

    async fn resolve(&self, id: i64) -> Result<ConnectionTarget> {
        let state = self.state.read().await;
        let profile = state
            .connection(id)
            .filter(|c| c.is_active)
            .ok_or_else(|| connection_not_found(id))?;

        Ok(ConnectionTarget {
            host: profile.host.clone(),
            port: profile.port,
            database_name: profile.database_name.clone(),
            username: profile.username.clone(),
            password: self.cipher.decrypt(&profile.password_encrypted)?,
        })
    }
}

#[async_trait]
impl SavedQueryStore for InMemoryStore {
    async fn list_queries(&self) -> Result<Vec<SavedQuery>> {
        let state = self.state.read().await;
        let mut queries: Vec<SavedQuery> = state
            .queries
            .iter()
            .map(|q| SavedQuery {
                connection_name: state.connection_name(q.connection_id),
                ..q.clone()
            })
            .collect();
        queries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(queries)
    }

    async fn create_query(&self, input: &SavedQueryInput) -> Result<SavedQuery> {
        let fields = input.validate()?;

        let mut state = self.state.write().await;
        state.require_connection(fields.connection_id)?;

        let now = Utc::now();
        let query = SavedQuery {
            id: state.next_id(),
            name: fields.name,
            description: fields.description,
            sql_query: fields.sql_query,
            connection_id: fields.connection_id,
            connection_name: None,
            is_public: fields.is_public,
            created_at: now,
            updated_at: now,
        };
        state.queries.push(query.clone());
        Ok(query)
    }
}

#[async_trait]
impl TableViewStore for InMemoryStore {
    async fn list_views(&self) -> Result<Vec<SavedTableView>> {
        let state = self.state.read().await;
        let mut views: Vec<SavedTableView> = state
            .views
            .iter()
            .filter(|v| state.connection(v.connection_id).is_some_and(|c| c.is_active))
            .map(|v| state.with_connection_name(v))
            .collect();
        views.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(views)
    }

    async fn create_view(&self, input: &TableViewInput) -> Result<SavedTableView> {
        let fields = input.validate()?;

        let mut state = self.state.write().await;
        state.require_connection(fields.connection_id)?;
        if state
            .views
            .iter()
            .any(|v| v.connection_id == fields.connection_id && v.table_name == fields.table_name)
        {
            return Err(Error::Conflict(DUPLICATE_VIEW.to_string()));
        }

        let sort_order = state.views.iter().map(|v| v.sort_order).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let view = SavedTableView {
            id: state.next_id(),
            connection_id: fields.connection_id,
            connection_name: None,
            table_name: fields.table_name,
            display_name: fields.display_name,
            icon: fields.icon,
            is_active: true,
            sort_order,
            created_at: now,
            updated_at: now,
        };
        state.views.push(view.clone());
        Ok(state.with_connection_name(&view))
    }

    async fn update_view(&self, id: i64, patch: &TableViewPatch) -> Result<SavedTableView> {
        let mut state = self.state.write().await;
        let view = state
            .views
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| view_not_found(id))?;

        if let Some(display_name) = &patch.display_name {
            view.display_name = display_name.clone();
        }
        if let Some(icon) = &patch.icon {
            view.icon = icon.clone();
        }
        if let Some(sort_order) = patch.sort_order {
            view.sort_order = sort_order;
        }
        view.updated_at = Utc::now();

        let updated = view.clone();
        Ok(state.with_connection_name(&updated))
    }

    async fn delete_view(&self, id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.views.len();
        state.views.retain(|v| v.id != id);
        if state.views.len() == before {
            return Err(view_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminStore for InMemoryStore {
    async fn stats(&self) -> Result<DashboardStats> {
        let state = self.state.read().await;
        Ok(DashboardStats {
            total_connections: state.connections.iter().filter(|c| c.is_active).count() as i64,
            active_tables: 0,
            saved_queries: state.queries.len() as i64,
            total_records: 0,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
