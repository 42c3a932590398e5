//! Read-only CMS content.
//!
//! Queries go to a headless CMS and come back as typed records. A failed
//! fetch never fails a page: the degrading accessors log it and answer with
//! an empty list, same as an empty result set.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, make_cache_key};
use crate::metrics::{CONTENT_CACHE_HITS, CONTENT_CACHE_MISSES, CONTENT_CACHE_SIZE, CONTENT_FALLBACKS};
use crate::models::{Course, Post, Resource, SlugStamp, SuccessStory, Teacher};
use crate::rate_limit::RateLimiter;

pub const DEFAULT_API_VERSION: &str = "2024-01-01";

// Section listings on the site show this many entries
pub const LISTING_LIMIT: usize = 6;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content fetch failed: {0}")]
    Fetch(String),
    #[error("content for {query} has unexpected shape: {reason}")]
    Shape { query: &'static str, reason: String },
    #[error("content fetches for {0} are rate limited")]
    RateLimited(&'static str),
}

impl From<reqwest::Error> for ContentError {
    fn from(err: reqwest::Error) -> Self {
        ContentError::Fetch(err.to_string())
    }
}

/// A named GROQ query plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    pub name: &'static str,
    pub groq: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ContentQuery {
    fn new(name: &'static str, groq: &'static str) -> Self {
        Self {
            name,
            groq,
            params: Vec::new(),
        }
    }

    fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

pub mod queries {
    use super::ContentQuery;

    pub fn teachers() -> ContentQuery {
        ContentQuery::new(
            "teachers",
            r#"*[_type == "teacher"] | order(name asc) {
    _id, name, photo, qualification, subject, teachingPhilosophy
}"#,
        )
    }

    pub fn courses() -> ContentQuery {
        ContentQuery::new(
            "courses",
            r#"*[_type == "course"] | order(gradeLevel asc) {
    _id, title, gradeLevel, subject, syllabus, slug
}"#,
        )
    }

    pub fn course_by_slug(slug: &str) -> ContentQuery {
        ContentQuery::new(
            "courseBySlug",
            r#"*[_type == "course" && slug.current == $slug][0] {
    _id, title, gradeLevel, subject, syllabus, slug
}"#,
        )
        .param("slug", slug)
    }

    pub fn success_stories() -> ContentQuery {
        ContentQuery::new(
            "successStories",
            r#"*[_type == "successStory"] | order(year desc) {
    _id, studentName, photo, marks, rank, testimonialQuote, year
}"#,
        )
    }

    pub fn posts() -> ContentQuery {
        ContentQuery::new(
            "posts",
            r#"*[_type == "post"] | order(publishedAt desc) {
    _id, title, slug, mainImage, excerpt, publishedAt, author->{name, photo}
}"#,
        )
    }

    pub fn post_by_slug(slug: &str) -> ContentQuery {
        ContentQuery::new(
            "postBySlug",
            r#"*[_type == "post" && slug.current == $slug][0] {
    _id, title, slug, mainImage, excerpt, body, publishedAt,
    author->{name, photo, qualification}
}"#,
        )
        .param("slug", slug)
    }

    pub fn resources() -> ContentQuery {
        ContentQuery::new(
            "resources",
            r#"*[_type == "resource"] | order(title asc) {
    _id, title, description, pdfFile{asset->{url}}, slug, category
}"#,
        )
    }

    pub fn resource_by_slug(slug: &str) -> ContentQuery {
        ContentQuery::new(
            "resourceBySlug",
            r#"*[_type == "resource" && slug.current == $slug][0] {
    _id, title, description, pdfFile{asset->{url}}, slug, category
}"#,
        )
        .param("slug", slug)
    }

    pub fn course_stamps() -> ContentQuery {
        ContentQuery::new("courseStamps", r#"*[_type == "course"] { slug, _updatedAt }"#)
    }

    pub fn post_stamps() -> ContentQuery {
        ContentQuery::new("postStamps", r#"*[_type == "post"] { slug, _updatedAt }"#)
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Run a query and return its raw `result`.
    async fn fetch(&self, query: &ContentQuery) -> Result<Value, ContentError>;
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Value,
}

/// HTTP client for the Sanity query API.
pub struct SanityClient {
    client: reqwest::Client,
    base_url: String,
    dataset: String,
    api_version: String,
    token: Option<String>,
}

impl SanityClient {
    pub fn new(client: reqwest::Client, project_id: &str, dataset: impl Into<String>) -> Self {
        Self {
            client,
            base_url: format!("https://{}.api.sanity.io", project_id),
            dataset: dataset.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn query_url(&self) -> String {
        format!(
            "{}/v{}/data/query/{}",
            self.base_url, self.api_version, self.dataset
        )
    }
}

#[async_trait]
impl ContentSource for SanityClient {
    async fn fetch(&self, query: &ContentQuery) -> Result<Value, ContentError> {
        // params travel JSON encoded as `$name=<json>`
        let mut params: Vec<(String, String)> = vec![("query".to_string(), query.groq.to_string())];
        for (name, value) in &query.params {
            let encoded = serde_json::to_string(value)
                .map_err(|e| ContentError::Fetch(e.to_string()))?;
            params.push((format!("${}", name), encoded));
        }

        let mut req = self.client.get(self.query_url()).query(&params);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(ContentError::Fetch(format!(
                "{} answered with status {}",
                query.name, status
            )));
        }

        let body: QueryResponse = res.json().await?;
        Ok(body.result)
    }
}

// Fetch throttle for the CMS, shared by all queries of one name
#[derive(Debug, Clone, Copy)]
pub struct ContentLimits {
    pub ttl: Duration,
    pub max_fetches: u32,
    pub window: Duration,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_fetches: 50,
            window: Duration::from_secs(60),
        }
    }
}

pub struct ContentService {
    source: Arc<dyn ContentSource>,
    limiter: Arc<RateLimiter>,
    cache: DashMap<String, CacheEntry>,
    limits: ContentLimits,
}

impl ContentService {
    pub fn new(source: Arc<dyn ContentSource>, limiter: Arc<RateLimiter>, limits: ContentLimits) -> Self {
        Self {
            source,
            limiter,
            cache: DashMap::new(),
            limits,
        }
    }

    async fn fetch_raw(&self, query: &ContentQuery) -> Result<Value, ContentError> {
        let key = make_cache_key(query);

        let cached = self
            .cache
            .get(&key)
            .filter(|entry| entry.created_at.elapsed() < self.limits.ttl)
            .map(|entry| entry.body.clone());
        if let Some(body) = cached {
            CONTENT_CACHE_HITS.inc();
            debug!(query = query.name, "Content cache HIT");
            return Ok(body);
        }
        CONTENT_CACHE_MISSES.inc();

        let limit_key = format!("content_fetch:{}", query.name);
        if !self
            .limiter
            .check(&limit_key, self.limits.max_fetches, self.limits.window)
        {
            return Err(ContentError::RateLimited(query.name));
        }

        let body = self.source.fetch(query).await?;
        self.cache.insert(
            key,
            CacheEntry {
                body: body.clone(),
                created_at: Instant::now(),
            },
        );
        CONTENT_CACHE_SIZE.set(self.cache.len() as f64);
        Ok(body)
    }

    /// Fetch a list query and decode every record. `null` counts as empty.
    pub async fn fetch_list<T: DeserializeOwned>(&self, query: &ContentQuery) -> Result<Vec<T>, ContentError> {
        match self.fetch_raw(query).await? {
            Value::Null => Ok(Vec::new()),
            value @ Value::Array(_) => serde_json::from_value(value).map_err(|e| ContentError::Shape {
                query: query.name,
                reason: e.to_string(),
            }),
            other => Err(ContentError::Shape {
                query: query.name,
                reason: format!("expected an array, got {}", json_type(&other)),
            }),
        }
    }

    /// Fetch a single-document query. `null` means not found.
    pub async fn fetch_one<T: DeserializeOwned>(&self, query: &ContentQuery) -> Result<Option<T>, ContentError> {
        match self.fetch_raw(query).await? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ContentError::Shape {
                    query: query.name,
                    reason: e.to_string(),
                }),
        }
    }

    async fn list_or_empty<T: DeserializeOwned>(&self, query: ContentQuery) -> Vec<T> {
        match self.fetch_list(&query).await {
            Ok(items) => items,
            Err(e) => {
                CONTENT_FALLBACKS.with_label_values(&[query.name]).inc();
                warn!(query = query.name, error = %e, "Falling back to empty content");
                Vec::new()
            }
        }
    }

    async fn one_or_none<T: DeserializeOwned>(&self, query: ContentQuery) -> Option<T> {
        match self.fetch_one(&query).await {
            Ok(item) => item,
            Err(e) => {
                CONTENT_FALLBACKS.with_label_values(&[query.name]).inc();
                warn!(query = query.name, error = %e, "Falling back to missing content");
                None
            }
        }
    }

    pub async fn teachers(&self) -> Vec<Teacher> {
        let mut teachers: Vec<Teacher> = self.list_or_empty(queries::teachers()).await;
        teachers.truncate(LISTING_LIMIT);
        teachers
    }

    pub async fn courses(&self) -> Vec<Course> {
        let mut courses: Vec<Course> = self.list_or_empty(queries::courses()).await;
        courses.truncate(LISTING_LIMIT);
        courses
    }

    pub async fn course_by_slug(&self, slug: &str) -> Option<Course> {
        self.one_or_none(queries::course_by_slug(slug)).await
    }

    pub async fn success_stories(&self) -> Vec<SuccessStory> {
        let mut stories: Vec<SuccessStory> = self.list_or_empty(queries::success_stories()).await;
        stories.truncate(LISTING_LIMIT);
        stories
    }

    pub async fn posts(&self) -> Vec<Post> {
        let mut posts: Vec<Post> = self.list_or_empty(queries::posts()).await;
        posts.truncate(LISTING_LIMIT);
        posts
    }

    pub async fn post_by_slug(&self, slug: &str) -> Option<Post> {
        self.one_or_none(queries::post_by_slug(slug)).await
    }

    pub async fn resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self.list_or_empty(queries::resources()).await;
        resources.truncate(LISTING_LIMIT);
        resources
    }

    // Only resources that actually have a file to hand out
    pub async fn downloadable_resources(&self) -> Vec<Resource> {
        let resources: Vec<Resource> = self.list_or_empty(queries::resources()).await;
        resources
            .into_iter()
            .filter(|r| r.asset_url().is_some())
            .take(LISTING_LIMIT)
            .collect()
    }

    pub async fn resource_by_slug(&self, slug: &str) -> Option<Resource> {
        self.one_or_none(queries::resource_by_slug(slug)).await
    }

    pub async fn course_stamps(&self) -> Result<Vec<SlugStamp>, ContentError> {
        self.fetch_list(&queries::course_stamps()).await
    }

    pub async fn post_stamps(&self) -> Result<Vec<SlugStamp>, ContentError> {
        self.fetch_list(&queries::post_stamps()).await
    }

    /// Drop cache entries older than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let before = self.cache.len();
        self.cache
            .retain(|_, entry| entry.created_at.elapsed() < self.limits.ttl);
        CONTENT_CACHE_SIZE.set(self.cache.len() as f64);
        before.saturating_sub(self.cache.len())
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
