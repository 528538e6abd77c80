//! Room HTTP API.
//!
//! [`RoomApi`] is the seam between the sync loop and the network: the loop
//! spawns each call and gets the outcome back as a completion. The
//! reqwest-backed [`HttpRoomApi`] is available behind the `http-api` feature.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{AnswersPayload, GuessResponse, PlayerInfo, VotesPayload};

/// Requests the sync engine issues against one room.
#[async_trait]
pub trait RoomApi: Send + Sync + 'static {
    /// `GET {game}/state`, returned raw so validation happens in one place.
    async fn fetch_state(&self) -> Result<String>;

    /// `POST petitbac/answers`.
    async fn post_answers(&self, answers: &AnswersPayload) -> Result<()>;

    /// `POST petitbac/votes`.
    async fn post_votes(&self, votes: &VotesPayload) -> Result<()>;

    /// `POST blindtest/guess`.
    async fn post_guess(&self, guess: &str) -> Result<GuessResponse>;

    /// `POST {game}/restart`.
    async fn restart(&self) -> Result<()>;

    /// `GET players`, in server order.
    async fn fetch_players(&self) -> Result<Vec<PlayerInfo>>;
}

#[cfg(feature = "http-api")]
pub use http::HttpRoomApi;

#[cfg(feature = "http-api")]
mod http {
    use std::sync::Arc;

    use async_trait::async_trait;
    use reqwest::{Client, Method, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use tracing::debug;

    use super::RoomApi;
    use crate::error::{Result, SyncError};
    use crate::phase::GameKind;
    use crate::protocol::{
        encode_path_segment, AnswersPayload, GuessRequest, GuessResponse, PlayerInfo,
        VotesPayload,
    };

    /// [`RoomApi`] over HTTP, rooted at `{base}/api/salle/{code}`.
    #[derive(Clone)]
    pub struct HttpRoomApi {
        client: Client,
        room_url: Arc<str>,
        game: GameKind,
    }

    impl HttpRoomApi {
        /// Build an API client for `room_code` on the server at `base_url`.
        ///
        /// # Errors
        ///
        /// Returns [`SyncError::Config`] if the HTTP client cannot be built.
        pub fn new(base_url: &str, room_code: &str, game: GameKind) -> Result<Self> {
            let client = Client::builder().build().map_err(|e| SyncError::Config {
                var: "http client",
                reason: e.to_string(),
            })?;
            Ok(Self::with_client(client, base_url, room_code, game))
        }

        /// Same as [`new`](Self::new) with a caller-provided client.
        pub fn with_client(client: Client, base_url: &str, room_code: &str, game: GameKind) -> Self {
            let room_url = format!(
                "{}/api/salle/{}",
                base_url.trim_end_matches('/'),
                encode_path_segment(room_code)
            );
            Self {
                client,
                room_url: Arc::from(room_url),
                game,
            }
        }

        fn game_path(&self, action: &str) -> String {
            format!("{}/{}", self.game.api_segment(), action)
        }

        fn request(&self, method: Method, path: &str) -> RequestBuilder {
            self.client
                .request(method, format!("{}/{}", self.room_url, path))
        }

        async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
            let response = builder.send().await.map_err(|e| SyncError::Fetch {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;
            let status = response.status();
            debug!(endpoint = path, status = status.as_u16(), "room api response");
            if status.is_success() {
                Ok(response)
            } else {
                Err(SyncError::Status {
                    endpoint: path.to_string(),
                    status: status.as_u16(),
                })
            }
        }

        async fn json<T: DeserializeOwned>(&self, response: Response, path: &str) -> Result<T> {
            response.json::<T>().await.map_err(|e| SyncError::Validation(format!(
                "`{path}` response: {e}"
            )))
        }
    }

    #[async_trait]
    impl RoomApi for HttpRoomApi {
        async fn fetch_state(&self) -> Result<String> {
            let path = self.game_path("state");
            let response = self.send(self.request(Method::GET, &path), &path).await?;
            response.text().await.map_err(|e| SyncError::Fetch {
                endpoint: path,
                reason: e.to_string(),
            })
        }

        async fn post_answers(&self, answers: &AnswersPayload) -> Result<()> {
            let path = self.game_path("answers");
            self.send(self.request(Method::POST, &path).json(answers), &path)
                .await
                .map(drop)
        }

        async fn post_votes(&self, votes: &VotesPayload) -> Result<()> {
            let path = self.game_path("votes");
            self.send(self.request(Method::POST, &path).json(votes), &path)
                .await
                .map(drop)
        }

        async fn post_guess(&self, guess: &str) -> Result<GuessResponse> {
            let path = self.game_path("guess");
            let body = GuessRequest {
                guess: guess.to_string(),
            };
            let response = self
                .send(self.request(Method::POST, &path).json(&body), &path)
                .await?;
            self.json(response, &path).await
        }

        async fn restart(&self) -> Result<()> {
            let path = self.game_path("restart");
            self.send(self.request(Method::POST, &path), &path)
                .await
                .map(drop)
        }

        async fn fetch_players(&self) -> Result<Vec<PlayerInfo>> {
            let path = "players";
            let response = self.send(self.request(Method::GET, path), path).await?;
            self.json(response, path).await
        }
    }

    impl std::fmt::Debug for HttpRoomApi {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpRoomApi")
                .field("room_url", &self.room_url)
                .field("game", &self.game)
                .finish()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn room_url_encodes_code_and_trims_slash() {
            let api = HttpRoomApi::with_client(
                Client::new(),
                "https://jeux.example/",
                "AB 12",
                GameKind::Music,
            );
            assert_eq!(&*api.room_url, "https://jeux.example/api/salle/AB%2012");
            assert_eq!(api.game_path("guess"), "blindtest/guess");
        }
    }
}
