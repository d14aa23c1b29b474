use serde_json::Value;
use tracing::debug;

use crate::lsp::adapter::{
    as_bool_lenient, as_f64_lenient, as_u64_lenient, first_field_with, FEE_PERCENT_FIELDS,
    FEE_PPM_FIELDS, MAX_CHANNEL_FIELDS, MIN_CHANNEL_FIELDS, MIN_CONFIRMATIONS_FIELDS,
    URI_FIELDS, ZERO_CONF_FIELDS, ZERO_RESERVE_FIELDS,
};
use crate::types::{
    LspCapabilities, DEFAULT_FEE_RATE_PERCENT, DEFAULT_MAX_CHANNEL_SATS,
    DEFAULT_MIN_CHANNEL_SATS, PLATFORM_MIN_CHANNEL_SATS,
};

/// LSPS1-style documents keep their limits under this object
const NESTED_OPTIONS_FIELD: &str = "options";
const PPM_PER_PERCENT: f64 = 10_000.0;

/// Turns a raw capability document into validated bounds and a fee model.
/// Resolution never fails: anything missing or malformed falls back to the
/// defaults.
#[derive(Debug, Clone)]
pub struct CapabilityResolver {
    platform_floor_sats: u64,
    suggested_channel_sats: Option<u64>,
}

impl Default for CapabilityResolver {
    fn default() -> Self {
        Self {
            platform_floor_sats: PLATFORM_MIN_CHANNEL_SATS,
            suggested_channel_sats: None,
        }
    }
}

impl CapabilityResolver {
    pub fn new(platform_floor_sats: u64, suggested_channel_sats: Option<u64>) -> Self {
        Self {
            platform_floor_sats,
            suggested_channel_sats,
        }
    }

    pub fn resolve(&self, document: &Value) -> LspCapabilities {
        let sources = Sources::new(document);

        let advertised_min = sources
            .u64(MIN_CHANNEL_FIELDS)
            .unwrap_or(DEFAULT_MIN_CHANNEL_SATS);
        let advertised_max = sources
            .u64(MAX_CHANNEL_FIELDS)
            .unwrap_or(DEFAULT_MAX_CHANNEL_SATS);

        let min_channel_sats = advertised_min.max(self.platform_floor_sats);
        // An inverted range collapses onto the minimum
        let max_channel_sats = advertised_max.max(min_channel_sats);

        let fee_rate_percent = sources
            .f64(FEE_PERCENT_FIELDS)
            .filter(|pct| *pct >= 0.0)
            .or_else(|| {
                sources
                    .f64(FEE_PPM_FIELDS)
                    .filter(|ppm| *ppm >= 0.0)
                    .map(|ppm| ppm / PPM_PER_PERCENT)
            })
            .unwrap_or(DEFAULT_FEE_RATE_PERCENT);

        let supports_zero_conf = sources.bool(ZERO_CONF_FIELDS).unwrap_or_else(|| {
            sources.u64(MIN_CONFIRMATIONS_FIELDS) == Some(0)
        });
        let supports_zero_reserve = sources.bool(ZERO_RESERVE_FIELDS).unwrap_or(false);

        let default_channel_sats = self
            .suggested_channel_sats
            .unwrap_or(min_channel_sats)
            .clamp(min_channel_sats, max_channel_sats);

        let uris = sources.uris();

        debug!(
            advertised_min,
            advertised_max,
            min_channel_sats,
            max_channel_sats,
            fee_rate_percent,
            supports_zero_conf,
            supports_zero_reserve,
            uri_count = uris.len(),
            "Resolved LSP capabilities"
        );

        LspCapabilities {
            min_channel_sats,
            max_channel_sats,
            fee_rate_percent,
            supports_zero_conf,
            supports_zero_reserve,
            default_channel_sats,
            uris,
        }
    }
}

/// The document itself, then its nested options object
struct Sources<'a> {
    layers: Vec<&'a Value>,
}

impl<'a> Sources<'a> {
    fn new(document: &'a Value) -> Self {
        let mut layers = vec![document];
        if let Some(options) = document.get(NESTED_OPTIONS_FIELD).filter(|v| v.is_object()) {
            layers.push(options);
        }
        Self { layers }
    }

    fn u64(&self, fields: &[&str]) -> Option<u64> {
        self.layers
            .iter()
            .find_map(|layer| first_field_with(layer, fields, as_u64_lenient))
    }

    fn f64(&self, fields: &[&str]) -> Option<f64> {
        self.layers
            .iter()
            .find_map(|layer| first_field_with(layer, fields, as_f64_lenient))
    }

    fn bool(&self, fields: &[&str]) -> Option<bool> {
        self.layers
            .iter()
            .find_map(|layer| first_field_with(layer, fields, as_bool_lenient))
    }

    fn uris(&self) -> Vec<String> {
        self.layers
            .iter()
            .find_map(|layer| {
                first_field_with(layer, URI_FIELDS, |v| {
                    v.as_array().map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                })
            })
            .unwrap_or_default()
    }
}
