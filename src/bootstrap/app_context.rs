use std::sync::Arc;

use crate::application::client::Db;
use crate::bootstrap::config::Config;
use crate::presentation::routes::{ROUTES, RouteTable};

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

#[derive(Clone)]
pub struct AppServices {
    db: Db,
    routes: &'static RouteTable,
}

impl AppServices {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            routes: &ROUTES,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn db(&self) -> &Db {
        &self.services.db
    }

    pub fn routes(&self) -> &'static RouteTable {
        self.services.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::memory::InMemoryDocumentStore;

    #[test]
    fn clones_hand_out_the_same_db() {
        let db = Db::from_store(Arc::new(InMemoryDocumentStore::new()));
        let ctx = AppContext::new(Config::default(), AppServices::new(db.clone()));
        let other = ctx.clone();
        assert!(ctx.db().same_handle(other.db()));
        assert!(ctx.db().same_handle(&db));
        assert!(std::ptr::eq(ctx.routes(), other.routes()));
    }
}
