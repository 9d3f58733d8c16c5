//! Imagery fetching with a primary/fallback provider chain.
//!
//! URL templates come from config with `{lat}`/`{lon}` placeholders (the
//! satellite template is expected to render a marker at the coordinate so
//! vision prompts can reference it). A fetch validates the URL actually
//! serves an image before handing it to the vision stage; a dead primary
//! falls through to the fallback.

use log::{debug, warn};

use crate::config::ImageryEndpoints;
use crate::model::{ImageKind, ImageRef};

use super::{AdapterError, ImageryProvider};

pub struct HttpImageryProvider {
    client: reqwest::blocking::Client,
    endpoints: ImageryEndpoints,
}

impl HttpImageryProvider {
    pub fn new(client: reqwest::blocking::Client, endpoints: ImageryEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn candidates(&self, kind: ImageKind) -> Vec<&str> {
        let (primary, fallback) = match kind {
            ImageKind::Satellite => (
                self.endpoints.satellite_url.as_str(),
                self.endpoints.satellite_fallback_url.as_deref(),
            ),
            ImageKind::Street => (
                self.endpoints.street_url.as_str(),
                self.endpoints.street_fallback_url.as_deref(),
            ),
        };

        let mut urls = vec![primary];
        if let Some(fallback) = fallback {
            urls.push(fallback);
        }
        urls.retain(|u| !u.is_empty());
        urls
    }

    fn probe(&self, url: &str) -> Result<(), AdapterError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.endpoints.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "imagery"));
        }
        Ok(())
    }
}

impl ImageryProvider for HttpImageryProvider {
    fn fetch_image(&self, lat: f64, lon: f64, kind: ImageKind) -> Result<ImageRef, AdapterError> {
        let candidates = self.candidates(kind);
        if candidates.is_empty() {
            return Err(AdapterError::Validation(format!(
                "No {} imagery endpoint configured",
                kind.as_str()
            )));
        }

        let mut last_err = None;
        for template in candidates {
            let url = render_template(template, lat, lon);
            match self.probe(&url) {
                Ok(()) => {
                    debug!("Fetched {} image from {}", kind.as_str(), provider_label(&url));
                    return Ok(ImageRef {
                        provider: provider_label(&url),
                        url,
                    });
                }
                Err(e) => {
                    warn!(
                        "{} imagery provider {} unavailable: {}",
                        kind.as_str(),
                        provider_label(&url),
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            AdapterError::Transient("All imagery providers failed".to_string())
        }))
    }
}

/// Substitutes coordinate placeholders into a URL template.
pub(crate) fn render_template(template: &str, lat: f64, lon: f64) -> String {
    template
        .replace("{lat}", &format!("{:.6}", lat))
        .replace("{lon}", &format!("{:.6}", lon))
}

/// The host part of a URL, used as the provider label in stored results.
pub(crate) fn provider_label(url: &str) -> String {
    let after_scheme = url.split("://").nth(1).unwrap_or(url);
    after_scheme
        .split('/')
        .next()
        .unwrap_or(after_scheme)
        .to_string()
}
