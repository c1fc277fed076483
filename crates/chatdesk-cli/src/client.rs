//! HTTP client for the chatdesk store endpoints.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use chatdesk_schema::{
    AddMessageRequest, ChatMessage, ChatsDump, ErrorBody, FileInfo, HealthResponse,
    NewChatResponse,
};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone)]
pub struct StoreClient {
    client: Client,
    base_url: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.url(&["health"])?)
            .send()
            .await
            .with_context(|| format!("chatdesk server unreachable at {}", self.base_url))?;
        let body: HealthResponse = decode(resp).await?;
        if body.status != "ok" {
            return Err(anyhow!("chatdesk server unhealthy: {}", body.status));
        }
        Ok(())
    }

    pub async fn new_chat(&self) -> Result<String> {
        let resp = self.client.post(self.url(&["new-chat"])?).send().await?;
        let body: NewChatResponse = decode(resp).await?;
        Ok(body.session_id)
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let resp = self
            .client
            .get(self.url(&["get-history", session_id])?)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn chats(&self) -> Result<ChatsDump> {
        let resp = self.client.get(self.url(&["get-chats"])?).send().await?;
        decode(resp).await
    }

    pub async fn sessions(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.url(&["get-all-sessions"])?)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn add_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<Vec<ChatMessage>> {
        let resp = self
            .client
            .post(self.url(&["add-message", session_id])?)
            .json(&AddMessageRequest { message })
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn save_file_info(&self, info: &FileInfo) -> Result<FileInfo> {
        let resp = self
            .client
            .post(self.url(&["save-file-info"])?)
            .json(info)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn files_info(&self) -> Result<Vec<FileInfo>> {
        let resp = self
            .client
            .get(self.url(&["get-files-info"])?)
            .send()
            .await?;
        decode(resp).await
    }

    /// Candidates whose name and path are both unknown to the registry, in
    /// input order. These are the files an ingestion run still has to load.
    pub async fn pending_files(&self, candidates: Vec<FileInfo>) -> Result<Vec<FileInfo>> {
        let registered = self.files_info().await?;
        Ok(filter_unregistered(&registered, candidates))
    }

    /// Endpoint URL under the base; each segment is percent-encoded, so ids
    /// containing `/`, `?` or `#` stay a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid chatdesk server url: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("chatdesk server url cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn filter_unregistered(registered: &[FileInfo], candidates: Vec<FileInfo>) -> Vec<FileInfo> {
    let names: HashSet<&str> = registered.iter().map(|f| f.file_name.as_str()).collect();
    let paths: HashSet<&str> = registered.iter().map(|f| f.file_path.as_str()).collect();
    candidates
        .into_iter()
        .filter(|c| !names.contains(c.file_name.as_str()) && !paths.contains(c.file_path.as_str()))
        .collect()
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json()
            .await
            .with_context(|| format!("invalid response body ({status})"));
    }

    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(anyhow!("chatdesk server error ({status}): {}", body.error)),
        Err(_) => Err(anyhow!("chatdesk server error ({status})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_unregistered_drops_known_names_and_paths() {
        let registered = vec![FileInfo::new("a.pdf", "/docs/a.pdf")];
        let candidates = vec![
            FileInfo::new("a.pdf", "/elsewhere/a.pdf"),
            FileInfo::new("a-copy.pdf", "/docs/a.pdf"),
            FileInfo::new("b.pdf", "/docs/b.pdf"),
        ];
        assert_eq!(
            filter_unregistered(&registered, candidates),
            vec![FileInfo::new("b.pdf", "/docs/b.pdf")]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = StoreClient::new("http://localhost:5000/");
        assert_eq!(
            client.url(&["new-chat"]).unwrap().as_str(),
            "http://localhost:5000/new-chat"
        );
    }

    #[test]
    fn session_id_is_one_encoded_segment() {
        let client = StoreClient::new("http://localhost:5000");
        assert_eq!(
            client.url(&["get-history", "a/b?c#d"]).unwrap().as_str(),
            "http://localhost:5000/get-history/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let client = StoreClient::new("http://proxy:8080/chatdesk");
        assert_eq!(
            client.url(&["get-chats"]).unwrap().as_str(),
            "http://proxy:8080/chatdesk/get-chats"
        );
    }
}
