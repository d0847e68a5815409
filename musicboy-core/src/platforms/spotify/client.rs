use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use musicboy_common::models::{
    CurrentlyPlaying, Paging, PlaybackState, PlaylistRef, Recommendations, SpotifyProfile,
    TimeRange, TopArtist, TopTrack,
};
use crate::Error;

const API_BASE: &str = "https://api.spotify.com/v1";

/// Thin bearer-token client over the Spotify Web API. Cheap to construct;
/// the session manager mints a fresh one per call with the current access
/// token, so a client handle never outlives its token's validity window by
/// much.
#[derive(Clone, Debug)]
pub struct SpotifyClient {
    http: ReqwestClient,
    access_token: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: ReqwestClient::new(),
            access_token: access_token.into(),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.access_token)
    }

    async fn check(resp: Response) -> Result<Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        // 401/403/429/5xx all surface as SpotifyApi here; only the session
        // manager (which knows the authorize URL) emits the typed re-auth
        // variants.
        let body = resp.text().await.unwrap_or_default();
        Err(Error::SpotifyApi(format!("{status}: {body}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let resp = Self::check(self.request(Method::GET, url).send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    /// GET that may legitimately answer 204 No Content.
    async fn get_optional_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, Error> {
        let resp = Self::check(self.request(Method::GET, url).send().await?).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(resp.json::<T>().await?))
    }

    async fn send_command(&self, method: Method, url: &str) -> Result<(), Error> {
        Self::check(self.request(method, url).send().await?).await?;
        Ok(())
    }

    /// `None` when nothing is playing (the API answers 204).
    pub async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, Error> {
        self.get_optional_json(&format!("{API_BASE}/me/player/currently-playing"))
            .await
    }

    /// Full playback state including the active device, or `None` when no
    /// device is active.
    pub async fn playback_state(&self) -> Result<Option<PlaybackState>, Error> {
        self.get_optional_json(&format!("{API_BASE}/me/player")).await
    }

    pub async fn pause(&self) -> Result<(), Error> {
        self.send_command(Method::PUT, &format!("{API_BASE}/me/player/pause"))
            .await
    }

    pub async fn play(&self) -> Result<(), Error> {
        self.send_command(Method::PUT, &format!("{API_BASE}/me/player/play"))
            .await
    }

    pub async fn next_track(&self) -> Result<(), Error> {
        self.send_command(Method::POST, &format!("{API_BASE}/me/player/next"))
            .await
    }

    pub async fn previous_track(&self) -> Result<(), Error> {
        self.send_command(Method::POST, &format!("{API_BASE}/me/player/previous"))
            .await
    }

    pub async fn set_volume(&self, volume_percent: u8) -> Result<(), Error> {
        let volume = volume_percent.min(100);
        self.send_command(
            Method::PUT,
            &format!("{API_BASE}/me/player/volume?volume_percent={volume}"),
        )
        .await
    }

    pub async fn top_tracks(
        &self,
        limit: u8,
        time_range: TimeRange,
    ) -> Result<Vec<TopTrack>, Error> {
        let page: Paging<TopTrack> = self
            .get_json(&format!(
                "{API_BASE}/me/top/tracks?limit={limit}&time_range={time_range}"
            ))
            .await?;
        Ok(page.items)
    }

    pub async fn top_artists(
        &self,
        limit: u8,
        time_range: TimeRange,
    ) -> Result<Vec<TopArtist>, Error> {
        let page: Paging<TopArtist> = self
            .get_json(&format!(
                "{API_BASE}/me/top/artists?limit={limit}&time_range={time_range}"
            ))
            .await?;
        Ok(page.items)
    }

    pub async fn recommendations(
        &self,
        seed_tracks: &[String],
        seed_artists: &[String],
        limit: u8,
    ) -> Result<Vec<TopTrack>, Error> {
        let mut url = format!("{API_BASE}/recommendations?limit={limit}");
        if !seed_tracks.is_empty() {
            url.push_str(&format!("&seed_tracks={}", seed_tracks.join(",")));
        }
        if !seed_artists.is_empty() {
            url.push_str(&format!("&seed_artists={}", seed_artists.join(",")));
        }
        let recs: Recommendations = self.get_json(&url).await?;
        Ok(recs.tracks)
    }

    pub async fn me(&self) -> Result<SpotifyProfile, Error> {
        self.get_json(&format!("{API_BASE}/me")).await
    }

    pub async fn create_playlist(
        &self,
        spotify_user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<PlaylistRef, Error> {
        let resp = self
            .request(
                Method::POST,
                &format!("{API_BASE}/users/{spotify_user_id}/playlists"),
            )
            .json(&serde_json::json!({
                "name": name,
                "description": description,
                "public": false,
            }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<PlaylistRef>().await?)
    }

    pub async fn add_playlist_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), Error> {
        let resp = self
            .request(Method::POST, &format!("{API_BASE}/playlists/{playlist_id}/tracks"))
            .json(&serde_json::json!({ "uris": uris }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
