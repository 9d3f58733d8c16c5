//! Builds an orchestrator over an in-memory database with fake providers.

use std::sync::Arc;

use lotscout::adapters::{
    GeocodeProvider, GisProvider, ImageryProvider, OwnerLookupProvider, VisionProvider,
};
use lotscout::db::Database;
use lotscout::model::PropertyInput;
use lotscout::orchestrator::{Orchestrator, Providers};
use lotscout::Config;

use super::fakes::{CountingImagery, FakeGeocoder, FakeGis, FakeOwner, FakeVision};

pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub db: Database,
}

pub struct HarnessBuilder {
    geocoder: Arc<dyn GeocodeProvider>,
    gis: Arc<dyn GisProvider>,
    imagery: Arc<dyn ImageryProvider>,
    vision: Arc<dyn VisionProvider>,
    owner: Arc<dyn OwnerLookupProvider>,
    config: Config,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.workers.gis = 2;
        config.workers.ai = 2;
        config.workers.skip_trace = 2;
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;

        Self {
            geocoder: Arc::new(FakeGeocoder { found: true }),
            gis: Arc::new(FakeGis::benign()),
            imagery: Arc::new(CountingImagery::new()),
            vision: Arc::new(FakeVision::calm()),
            owner: Arc::new(FakeOwner::with_record()),
            config,
        }
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn GeocodeProvider>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn gis(mut self, gis: Arc<dyn GisProvider>) -> Self {
        self.gis = gis;
        self
    }

    pub fn imagery(mut self, imagery: Arc<dyn ImageryProvider>) -> Self {
        self.imagery = imagery;
        self
    }

    pub fn vision(mut self, vision: Arc<dyn VisionProvider>) -> Self {
        self.vision = vision;
        self
    }

    pub fn owner(mut self, owner: Arc<dyn OwnerLookupProvider>) -> Self {
        self.owner = owner;
        self
    }

    pub fn config<F: FnOnce(&mut Config)>(mut self, tweak: F) -> Self {
        tweak(&mut self.config);
        self
    }

    pub fn build(self) -> TestHarness {
        let db = Database::open_in_memory().expect("in-memory database");
        let orchestrator = Orchestrator::new(
            db.clone(),
            self.config,
            Providers {
                geocoder: self.geocoder,
                gis: self.gis,
                imagery: self.imagery,
                vision: self.vision,
                owner: self.owner,
            },
        );
        TestHarness { orchestrator, db }
    }
}

pub fn property(street: &str) -> PropertyInput {
    PropertyInput {
        street: street.to_string(),
        city: "Seneca".to_string(),
        state: "SC".to_string(),
        postal_code: "29672".to_string(),
        contact_id: None,
        owner_name: None,
    }
}

pub fn batch(n: usize) -> Vec<PropertyInput> {
    (0..n).map(|i| property(&format!("{} Lake Rd", i + 1))).collect()
}
