use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::content::ContentService;
use crate::models::SlugStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ChangeFrequency {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub last_modified: DateTime<Utc>,
    pub change_frequency: ChangeFrequency,
    pub priority: f32,
}

// path, frequency, priority
const STATIC_PAGES: &[(&str, ChangeFrequency, f32)] = &[
    ("", ChangeFrequency::Daily, 1.0),
    ("/courses", ChangeFrequency::Weekly, 0.8),
    ("/teachers", ChangeFrequency::Monthly, 0.7),
    ("/success-stories", ChangeFrequency::Weekly, 0.7),
    ("/blog", ChangeFrequency::Daily, 0.6),
    ("/resources", ChangeFrequency::Weekly, 0.6),
];

fn static_entries(base_url: &str, now: DateTime<Utc>) -> Vec<SitemapEntry> {
    STATIC_PAGES
        .iter()
        .map(|(path, freq, priority)| SitemapEntry {
            url: format!("{}{}", base_url, path),
            last_modified: now,
            change_frequency: *freq,
            priority: *priority,
        })
        .collect()
}

fn stamped_entries(base_url: &str, prefix: &str, stamps: Vec<SlugStamp>, priority: f32) -> Vec<SitemapEntry> {
    stamps
        .into_iter()
        .map(|s| SitemapEntry {
            url: format!("{}/{}/{}", base_url, prefix, s.slug.current),
            last_modified: s.updated_at,
            change_frequency: ChangeFrequency::Monthly,
            priority,
        })
        .collect()
}

/// Static pages plus one entry per course and blog post. If either dynamic
/// query fails only the static pages are listed.
pub async fn build_sitemap(base_url: &str, content: &ContentService, now: DateTime<Utc>) -> Vec<SitemapEntry> {
    let base_url = base_url.trim_end_matches('/');
    let mut entries = static_entries(base_url, now);

    let dynamic = async {
        let courses = content.course_stamps().await?;
        let posts = content.post_stamps().await?;
        Ok::<_, crate::content::ContentError>((courses, posts))
    };

    match dynamic.await {
        Ok((courses, posts)) => {
            entries.extend(stamped_entries(base_url, "courses", courses, 0.6));
            entries.extend(stamped_entries(base_url, "blog", posts, 0.5));
        }
        Err(e) => warn!(error = %e, "Sitemap limited to static pages"),
    }

    entries
}

pub fn render_xml(entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for e in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape(&e.url)));
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            e.last_modified.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", e.change_frequency.as_str()));
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", e.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
