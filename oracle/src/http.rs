//! Production oracle: talks to the judge's HTTP API. Wire shapes and
//! request/response handling are grounded directly on the teacher's
//! `garasubo-solver/src/api.rs` (`ApiClient`), generalized to the
//! `Oracle` trait instead of being called ad hoc from a solve script.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warren_engine::oracle::{ExploreResult, GuessResult, Oracle, OracleError, SelectResult};
use warren_engine::MapDescription;

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Serialize)]
struct SelectRequestDto {
    #[serde(rename = "problemName")]
    problem_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_name: Option<String>,
}

#[derive(Deserialize)]
struct SelectResponseDto {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(rename = "problemName", default)]
    problem_name: String,
}

#[derive(Serialize)]
struct ExploreRequestDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    plans: Vec<String>,
}

#[derive(Deserialize)]
struct ExploreResponseDto {
    results: Vec<Vec<u8>>,
    #[serde(rename = "queryCount", default)]
    query_count: u32,
}

#[derive(Serialize)]
struct RoomDoorDto {
    room: u32,
    door: u32,
}

#[derive(Serialize)]
struct ConnectionDto {
    from: RoomDoorDto,
    to: RoomDoorDto,
}

#[derive(Serialize)]
struct GuessMapDto {
    rooms: Vec<u8>,
    #[serde(rename = "startingRoom")]
    starting_room: u32,
    connections: Vec<ConnectionDto>,
}

#[derive(Serialize)]
struct GuessRequestDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    map: GuessMapDto,
}

#[derive(Deserialize)]
struct GuessResponseDto {
    correct: bool,
}

impl From<&MapDescription> for GuessMapDto {
    fn from(map: &MapDescription) -> Self {
        GuessMapDto {
            rooms: map.rooms.clone(),
            starting_room: map.start_index,
            connections: map
                .connections
                .iter()
                .map(|c| ConnectionDto {
                    from: RoomDoorDto {
                        room: c.from.room,
                        door: c.from.door as u32,
                    },
                    to: RoomDoorDto {
                        room: c.to.room,
                        door: c.to.door as u32,
                    },
                })
                .collect(),
        }
    }
}

/// Credentials forwarded as the `CF-Access-Client-*` headers the
/// judge's Cloudflare Access frontend expects (teacher's `ApiClient`
/// reads these from `CLIENT_ID`/`CLIENT_SECRET` directly; the CLI's
/// `RunConfig` is responsible for loading them here instead so the
/// oracle crate stays transport-only).
#[derive(Debug, Clone, Default)]
pub struct TeamCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    credentials: TeamCredentials,
    session_id: Mutex<Option<String>>,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>, credentials: TeamCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials,
            session_id: Mutex::new(None),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.credentials.client_id, &self.credentials.client_secret) {
            (Some(id), Some(secret)) => builder
                .header("CF-Access-Client-Id", id)
                .header("CF-Access-Client-Secret", secret),
            _ => builder,
        }
    }

    fn session(&self) -> Option<String> {
        self.session_id.lock().expect("session mutex poisoned").clone()
    }

    /// Retry transient transport failures with exponential backoff;
    /// a non-2xx response is a `ServerReject` and is never retried.
    async fn send_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<T, OracleError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match build().send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| OracleError::Transport(format!("malformed response body: {e}")));
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(OracleError::ServerReject(format!("{status}: {text}")));
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(OracleError::Transport(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "exhausted retries".into()),
        ))
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn select(&self, problem_name: &str) -> Result<SelectResult, OracleError> {
        let url = format!("{}/select", self.base_url);
        let body = SelectRequestDto {
            problem_name: problem_name.to_string(),
            user_name: None,
        };
        let response: SelectResponseDto = self
            .send_with_retry(|| self.auth(self.client.post(&url)).json(&body))
            .await?;
        if let Some(id) = &response.session_id {
            *self.session_id.lock().expect("session mutex poisoned") = Some(id.clone());
        }
        Ok(SelectResult {
            problem_name: response.problem_name,
        })
    }

    async fn explore(&self, plans: &[String]) -> Result<ExploreResult, OracleError> {
        let url = format!("{}/explore", self.base_url);
        let body = ExploreRequestDto {
            session_id: self.session(),
            plans: plans.to_vec(),
        };
        let response: ExploreResponseDto = self
            .send_with_retry(|| self.auth(self.client.post(&url)).json(&body))
            .await?;
        Ok(ExploreResult {
            results: response.results,
            query_count: response.query_count,
        })
    }

    async fn guess(&self, map: &MapDescription) -> Result<GuessResult, OracleError> {
        let url = format!("{}/guess", self.base_url);
        let body = GuessRequestDto {
            session_id: self.session(),
            map: GuessMapDto::from(map),
        };
        let response: GuessResponseDto = self
            .send_with_retry(|| self.auth(self.client.post(&url)).json(&body))
            .await?;
        Ok(GuessResult {
            correct: response.correct,
        })
    }
}
