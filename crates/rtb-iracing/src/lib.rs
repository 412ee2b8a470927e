//! iRacing adapter (Data API).
//!
//! Implements the `rtb-core` ResultSource port. The Data API is
//! cookie-authenticated and serves payloads through signed link envelopes:
//! every endpoint returns `{"link": "..."}` pointing at the actual JSON.
//!
//! Without credentials the client stays idle and reports "no new result" on
//! every poll, so the bot still runs as a pure command surface.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rtb_core::{
    domain::{DriverId, RaceId, RaceReport},
    errors::Error,
    ports::ResultSource,
    Result,
};

const API_BASE: &str = "https://members-ng.iracing.com";

#[derive(Clone, Debug)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Default)]
struct ClientState {
    authenticated: bool,
    // Display-name → customer id, cached for the process lifetime.
    cust_ids: HashMap<String, u64>,
}

pub struct IracingClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    state: Mutex<ClientState>,
}

impl IracingClient {
    pub fn new(email: Option<String>, password: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client build");

        let credentials = match (email, password) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };
        if credentials.is_none() {
            info!("iRacing credentials not configured; result polling is idle");
        }

        Self {
            http,
            credentials,
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn ensure_auth(&self) -> Result<()> {
        let Some(creds) = &self.credentials else {
            return Err(Error::Upstream("iracing credentials missing".to_string()));
        };

        let mut state = self.state.lock().await;
        if state.authenticated {
            return Ok(());
        }

        let resp = self
            .http
            .post(format!("{API_BASE}/auth"))
            .json(&serde_json::json!({
                "email": creds.email,
                "password": creds.password,
            }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("iracing auth request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::Upstream(format!("iracing auth failed: {status}")));
        }

        state.authenticated = true;
        debug!("authenticated against iRacing");
        Ok(())
    }

    /// GET an endpoint, follow the `{"link": ...}` envelope, decode the
    /// linked payload.
    async fn fetch_linked<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .http
            .get(format!("{API_BASE}{path}"))
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("iracing request error: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Session cookie expired; re-auth on the next tick.
            self.state.lock().await.authenticated = false;
            return Err(Error::Upstream("iracing session expired".to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::Upstream(format!("iracing {path} failed: {status}")));
        }

        let envelope: LinkEnvelope = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("iracing envelope decode error: {e}")))?;

        let payload = self
            .http
            .get(&envelope.link)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("iracing link fetch error: {e}")))?;

        payload
            .json::<T>()
            .await
            .map_err(|e| Error::Upstream(format!("iracing payload decode error: {e}")))
    }

    async fn lookup_cust_id(&self, display_name: &str) -> Result<Option<u64>> {
        {
            let state = self.state.lock().await;
            if let Some(&id) = state.cust_ids.get(display_name) {
                return Ok(Some(id));
            }
        }

        let matches: Vec<DriverMatch> = self
            .fetch_linked(
                "/data/lookup/drivers",
                &[("search_term", display_name.to_string())],
            )
            .await?;

        let hit = matches
            .into_iter()
            .find(|m| m.display_name.trim().eq_ignore_ascii_case(display_name));

        let Some(hit) = hit else {
            return Ok(None);
        };

        self.state
            .lock()
            .await
            .cust_ids
            .insert(display_name.to_string(), hit.cust_id);
        Ok(Some(hit.cust_id))
    }
}

#[async_trait]
impl ResultSource for IracingClient {
    async fn latest_result(
        &self,
        driver: &DriverId,
        after: Option<RaceId>,
    ) -> Result<Option<RaceReport>> {
        if self.credentials.is_none() {
            return Ok(None);
        }
        self.ensure_auth().await?;

        let Some(cust_id) = self.lookup_cust_id(&driver.0).await? else {
            // Unknown to iRacing is not a transient failure; nothing to post.
            warn!(driver = %driver.0, "no iRacing customer id found");
            return Ok(None);
        };

        let recent: RecentRaces = self
            .fetch_linked(
                "/data/stats/member_recent_races",
                &[("cust_id", cust_id.to_string())],
            )
            .await?;

        Ok(newest_after(recent.races, after))
    }
}

/// Pick the newest race strictly after the last-seen marker.
fn newest_after(races: Vec<RecentRace>, after: Option<RaceId>) -> Option<RaceReport> {
    races
        .into_iter()
        .filter(|r| after.map(|a| r.subsession_id > a.0).unwrap_or(true))
        .max_by_key(|r| r.subsession_id)
        .map(RaceReport::from)
}

// === Wire types ===

#[derive(Debug, Deserialize)]
struct LinkEnvelope {
    link: String,
}

#[derive(Debug, Deserialize)]
struct DriverMatch {
    cust_id: u64,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct RecentRaces {
    races: Vec<RecentRace>,
}

#[derive(Debug, Deserialize)]
struct RecentRace {
    subsession_id: u64,
    series_name: String,
    track: TrackInfo,
    finish_position: u32,
    start_position: u32,
    #[serde(default)]
    field_size: u32,
    incidents: u32,
    oldi_rating: i32,
    newi_rating: i32,
    // Safety rating is reported as sub-level × 100.
    old_sub_level: u32,
    new_sub_level: u32,
    #[serde(default)]
    race_time: String,
    #[serde(default)]
    champ_points: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TrackInfo {
    track_name: String,
}

impl From<RecentRace> for RaceReport {
    fn from(r: RecentRace) -> Self {
        let old_sr = f64::from(r.old_sub_level) / 100.0;
        let new_sr = f64::from(r.new_sub_level) / 100.0;
        RaceReport {
            race_id: RaceId(r.subsession_id),
            series_name: r.series_name,
            track_name: r.track.track_name,
            finish_position: r.finish_position,
            start_position: r.start_position,
            field_size: r.field_size,
            incidents: r.incidents,
            irating_change: r.newi_rating - r.oldi_rating,
            new_irating: r.newi_rating.max(0) as u32,
            sr_change: new_sr - old_sr,
            new_sr,
            race_time: r.race_time,
            champ_points: r.champ_points,
        }
    }
}
