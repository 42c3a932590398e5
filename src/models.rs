use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::DownloadRequest;

// CMS slug object, `{ "current": "maths-class-10" }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Slug {
    pub current: String,
}

// Reference to an uploaded asset. Image fields carry `_ref`, file fields
// projected with `asset->` carry `url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetRef {
    #[serde(rename = "_ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Asset {
    #[serde(default)]
    pub asset: Option<AssetRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub photo: Option<Asset>,
    pub qualification: String,
    pub subject: String,
    pub teaching_philosophy: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    // "class-6" ..= "class-12"
    pub grade_level: String,
    pub subject: String,
    #[serde(default)]
    pub syllabus: Vec<String>,
    pub slug: Slug,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessStory {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_name: String,
    #[serde(default)]
    pub photo: Option<Asset>,
    pub marks: String,
    #[serde(default)]
    pub rank: Option<String>,
    pub testimonial_quote: String,
    pub year: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub photo: Option<Asset>,
    #[serde(default)]
    pub qualification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub slug: Slug,
    #[serde(default)]
    pub main_image: Option<Asset>,
    #[serde(default)]
    pub excerpt: Option<String>,
    // portable text blocks, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceCategory {
    StudyMaterial,
    PracticePapers,
    ExamTips,
    SyllabusGuide,
    #[serde(other)]
    Other,
}

impl ResourceCategory {
    pub fn title(&self) -> &'static str {
        match self {
            ResourceCategory::StudyMaterial => "Study Materials",
            ResourceCategory::PracticePapers => "Practice Papers",
            ResourceCategory::ExamTips => "Exam Tips",
            ResourceCategory::SyllabusGuide => "Syllabus Guides",
            ResourceCategory::Other => "Resources",
        }
    }
}

// Lead magnet - a PDF handed out after the download form
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pdf_file: Option<Asset>,
    #[serde(default)]
    pub slug: Option<Slug>,
    #[serde(default)]
    pub category: Option<ResourceCategory>,
}

impl Resource {
    pub fn asset_url(&self) -> Option<&str> {
        self.pdf_file
            .as_ref()
            .and_then(|f| f.asset.as_ref())
            .and_then(|a| a.url.as_deref())
            .filter(|url| !url.is_empty())
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_ref().map(|s| s.current.as_str())
    }
}

// Slug + last edit, for sitemap generation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlugStamp {
    pub slug: Slug,
    #[serde(rename = "_updatedAt")]
    pub updated_at: DateTime<Utc>,
}

// Demo booking form body. Missing fields are empty and fail validation later.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemoBookingForm {
    pub student_name: String,
    pub phone: String,
    pub class: String,
    pub subject_of_interest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDownloadForm {
    pub student_name: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadRequest>,
}

// Every failure carries a message and what to do next
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}
