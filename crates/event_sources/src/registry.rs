//! Static catalog of configured data sources.

use std::sync::Arc;

use coordinator_client::CoordinatorClient;
use event_cache::Cache;

use crate::translate::{ExtraParams, TranslatorKind};
use crate::{CsvEventSource, CsvSourceConfig, DataSource, JsonEventSource, JsonSourceConfig};

const DONKI_CME_URL: &str = "https://kauai.ccmc.gsfc.nasa.gov/DONKI/WS/get/CME";
const DONKI_FLR_URL: &str = "https://kauai.ccmc.gsfc.nasa.gov/DONKI/WS/get/FLR";
const FLARE_SCOREBOARD_URL: &str =
    "https://iswa.gsfc.nasa.gov/IswaSystemWebApp/flarescoreboard/hapi/data";
const RHESSI_FLARE_LIST_URL: &str =
    "https://umbra.nascom.nasa.gov/rhessi/rhessi_extras/flare_images_v2/hsi_flare_list.csv";

/// Flare scoreboard models: HAPI dataset id and display label.
const FLARE_MODELS: [(&str, &str); 10] = [
    ("SIDC_Operator_REGIONS", "SIDC Operator"),
    ("BoM_flare1_REGIONS", "Bureau of Meteorology"),
    ("AMOS_v1_REGIONS", "AMOS"),
    ("ASAP_1_REGIONS", "ASAP"),
    ("MAG4_LOS_FEr_REGIONS", "MAG4 LoS FEr"),
    ("MAG4_LOS_r_REGIONS", "MAG4 LoS r"),
    ("MAG4_SHARP_FE_REGIONS", "MAG4 Sharp FE"),
    ("MAG4_SHARP_REGIONS", "MAG4 Sharp"),
    ("MAG4_SHARP_HMI_REGIONS", "MAG4 Sharp HMI"),
    ("AEffort_REGIONS", "AEffort"),
];

/// The list of data sources known by the event interface. Built once at
/// startup; instances are shared across queries.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn DataSource>>,
}

impl SourceRegistry {
    /// The standard provider catalog.
    pub fn standard(
        http: reqwest::Client,
        cache: Arc<Cache>,
        coordinator: Arc<CoordinatorClient>,
    ) -> Self {
        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();

        sources.push(Arc::new(JsonEventSource::new(
            JsonSourceConfig {
                source: "CCMC".into(),
                name: "DONKI".into(),
                // "C3" rather than "CE": pins must be unique across all
                // sources and CE is taken elsewhere.
                pin: "C3".into(),
                uri: DONKI_CME_URL.into(),
                start_param: "startDate".into(),
                end_param: "endDate".into(),
                date_format: "%Y-%m-%d".into(),
                query: Vec::new(),
                translator: TranslatorKind::DonkiCme,
                extra: ExtraParams::default(),
            },
            http.clone(),
            cache.clone(),
            coordinator.clone(),
        )));

        // Flares share the "DONKI" category with the CME feed; the merge
        // step folds both feeds' groups under one entry.
        sources.push(Arc::new(JsonEventSource::new(
            JsonSourceConfig {
                source: "CCMC".into(),
                name: "DONKI".into(),
                pin: "F1".into(),
                uri: DONKI_FLR_URL.into(),
                start_param: "startDate".into(),
                end_param: "endDate".into(),
                date_format: "%Y-%m-%d".into(),
                query: Vec::new(),
                translator: TranslatorKind::DonkiFlare,
                extra: ExtraParams::default(),
            },
            http.clone(),
            cache.clone(),
            coordinator.clone(),
        )));

        for (id, label) in FLARE_MODELS {
            sources.push(Arc::new(JsonEventSource::new(
                JsonSourceConfig {
                    source: "CCMC".into(),
                    name: "Solar Flare Prediction".into(),
                    pin: "FP".into(),
                    uri: FLARE_SCOREBOARD_URL.into(),
                    start_param: "time.min".into(),
                    end_param: "time.max".into(),
                    date_format: "%Y-%m-%dT%H:%M:%S".into(),
                    query: vec![
                        ("id".into(), id.into()),
                        ("format".into(), "json".into()),
                        ("include".into(), "header".into()),
                    ],
                    translator: TranslatorKind::FlarePrediction,
                    extra: ExtraParams {
                        dataset: Some(label.into()),
                        offset: None,
                    },
                },
                http.clone(),
                cache.clone(),
                coordinator.clone(),
            )));
        }

        sources.push(Arc::new(CsvEventSource::new(
            CsvSourceConfig {
                source: "RHESSI".into(),
                name: "Solar Flares".into(),
                pin: "F2".into(),
                uri: RHESSI_FLARE_LIST_URL.into(),
                translator: TranslatorKind::RhessiFlare,
                extra: ExtraParams {
                    dataset: None,
                    offset: Some(0),
                },
            },
            http,
            cache,
            coordinator,
        )));

        Self { sources }
    }

    /// A registry over an explicit source list.
    pub fn from_sources(sources: Vec<Arc<dyn DataSource>>) -> Self {
        Self { sources }
    }

    pub fn all(&self) -> Vec<Arc<dyn DataSource>> {
        self.sources.clone()
    }

    /// Sources whose provider name matches one of `names`. Unknown names
    /// match nothing; they are not an error.
    pub fn with_names(&self, names: &[String]) -> Vec<Arc<dyn DataSource>> {
        self.sources
            .iter()
            .filter(|source| names.iter().any(|name| name == source.source_id()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::TimeWindow;
    use event_cache::MemoryStore;

    fn registry() -> SourceRegistry {
        let cache = Arc::new(Cache::new(Arc::new(MemoryStore::new())));
        let coordinator = Arc::new(CoordinatorClient::new(
            "http://127.0.0.1:1",
            std::time::Duration::from_millis(100),
            "swx-events/test",
        ));
        SourceRegistry::standard(reqwest::Client::new(), cache, coordinator)
    }

    #[test]
    fn catalog_lists_every_configured_feed() {
        assert_eq!(registry().all().len(), 13);
    }

    #[test]
    fn filters_by_provider_name() {
        let registry = registry();
        assert_eq!(registry.with_names(&["CCMC".into()]).len(), 12);
        assert_eq!(registry.with_names(&["RHESSI".into()]).len(), 1);
        assert!(registry.with_names(&["beep beep".into()]).is_empty());
    }

    #[test]
    fn cache_keys_are_unique_across_instances() {
        let registry = registry();
        let window = TimeWindow::new(Utc::now(), Duration::days(-1));
        let mut keys: Vec<String> = registry
            .all()
            .iter()
            .map(|source| source.cache_key(&window))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), registry.all().len());
    }
}
