//! SEO content hub: Markdown/MDX articles read from disk.
//!
//! Each file starts with a YAML frontmatter block fenced by `---` lines,
//! followed by the article body. Files are re-read on every request; the
//! content directory is small and edited out of band.

pub mod sitemap;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const WORDS_PER_MINUTE: usize = 200;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: missing frontmatter block")]
    MissingFrontmatter { path: PathBuf },
    #[error("{path}: invalid frontmatter: {source}")]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path}: frontmatter title is empty")]
    MissingTitle { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontmatter {
    pub title: String,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub date: Option<NaiveDate>,
    pub updated: Option<NaiveDate>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub image: Option<String>,
    pub draft: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    pub word_count: usize,
    pub reading_time_minutes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub slug: String,
    #[serde(flatten)]
    pub frontmatter: Frontmatter,
    pub stats: ContentStats,
    pub body: String,
}

/// Article without its body, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub updated: Option<NaiveDate>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub stats: ContentStats,
}

impl From<&Article> for ArticleSummary {
    fn from(a: &Article) -> Self {
        Self {
            slug: a.slug.clone(),
            title: a.frontmatter.title.clone(),
            description: a.frontmatter.description.clone(),
            date: a.frontmatter.date,
            updated: a.frontmatter.updated,
            author: a.frontmatter.author.clone(),
            category: a.frontmatter.category.clone(),
            tags: a.frontmatter.tags.clone(),
            image: a.frontmatter.image.clone(),
            stats: a.stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter<'a> {
    pub category: Option<&'a str>,
    pub tag: Option<&'a str>,
}

/// Reads articles from a content directory.
#[derive(Debug, Clone)]
pub struct ContentLibrary {
    root: PathBuf,
}

impl ContentLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every article under the root. Files that fail to parse are
    /// logged and skipped so one bad file does not take the hub down.
    pub async fn load_all(&self) -> Result<Vec<Article>, ContentError> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files).await?;
        files.sort();

        let mut articles = Vec::with_capacity(files.len());
        for path in files {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ContentError::Io { path: path.clone(), source })?;
            match parse_article(&path, &raw) {
                Ok(article) => articles.push(article),
                Err(e) => tracing::warn!(error = %e, "skipping content file"),
            }
        }
        Ok(articles)
    }

    /// Published articles, newest first. Undated articles sort last.
    pub async fn list(&self, filter: &ArticleFilter<'_>) -> Result<Vec<ArticleSummary>, ContentError> {
        let mut articles: Vec<Article> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|a| !a.frontmatter.draft)
            .filter(|a| {
                filter.category.map_or(true, |c| {
                    a.frontmatter.category.as_deref().is_some_and(|ac| ac.eq_ignore_ascii_case(c))
                })
            })
            .filter(|a| {
                filter
                    .tag
                    .map_or(true, |t| a.frontmatter.tags.iter().any(|at| at.eq_ignore_ascii_case(t)))
            })
            .collect();
        articles.sort_by(|a, b| {
            b.frontmatter
                .date
                .cmp(&a.frontmatter.date)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        Ok(articles.iter().map(ArticleSummary::from).collect())
    }

    /// A published article by slug.
    pub async fn get(&self, slug: &str) -> Result<Option<Article>, ContentError> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|a| a.slug == slug && !a.frontmatter.draft))
    }

    pub async fn categories(&self) -> Result<Vec<TermCount>, ContentError> {
        let articles = self.published().await?;
        Ok(count_terms(articles.iter().filter_map(|a| a.frontmatter.category.as_deref())))
    }

    pub async fn tags(&self) -> Result<Vec<TermCount>, ContentError> {
        let articles = self.published().await?;
        Ok(count_terms(
            articles.iter().flat_map(|a| a.frontmatter.tags.iter().map(String::as_str)),
        ))
    }

    async fn published(&self) -> Result<Vec<Article>, ContentError> {
        Ok(self.load_all().await?.into_iter().filter(|a| !a.frontmatter.draft).collect())
    }
}

async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ContentError> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(ContentError::Io { path: dir, source }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| ContentError::Io { path: dir.clone(), source })?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| ContentError::Io { path: path.clone(), source })?;
            if file_type.is_dir() {
                pending.push(path);
            } else if is_content_file(&path) {
                out.push(path);
            }
        }
    }
    Ok(())
}

fn is_content_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "mdx")
    )
}

/// Splits a document into its frontmatter YAML and body.
pub fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

pub fn parse_article(path: &Path, raw: &str) -> Result<Article, ContentError> {
    let (yaml, body) = split_frontmatter(raw)
        .ok_or_else(|| ContentError::MissingFrontmatter { path: path.to_path_buf() })?;
    let frontmatter: Frontmatter = serde_yaml::from_str(yaml)
        .map_err(|source| ContentError::Frontmatter { path: path.to_path_buf(), source })?;
    if frontmatter.title.trim().is_empty() {
        return Err(ContentError::MissingTitle { path: path.to_path_buf() });
    }

    let slug = frontmatter
        .slug
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(ToOwned::to_owned))
        .unwrap_or_default();
    let body = body.trim_start_matches(['\r', '\n']).to_string();

    Ok(Article {
        slug,
        stats: compute_stats(&body),
        frontmatter,
        body,
    })
}

/// Word count over prose only: code fences, MDX `import`/`export` lines and
/// JSX/HTML tags are excluded.
pub fn compute_stats(body: &str) -> ContentStats {
    let mut in_fence = false;
    let mut words = 0;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.starts_with("import ") || trimmed.starts_with("export ") {
            continue;
        }
        words += strip_tags(line)
            .split_whitespace()
            .filter(|w| w.chars().any(char::is_alphanumeric))
            .count();
    }
    ContentStats {
        word_count: words,
        reading_time_minutes: words.div_ceil(WORDS_PER_MINUTE).max(1),
    }
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => {
                depth -= 1;
                out.push(' ');
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn count_terms<'a>(terms: impl Iterator<Item = &'a str>) -> Vec<TermCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for term in terms {
        let term = term.trim();
        if !term.is_empty() {
            *counts.entry(term.to_string()).or_default() += 1;
        }
    }
    let mut out: Vec<TermCount> = counts
        .into_iter()
        .map(|(name, count)| TermCount { name, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "---\ntitle: Choosing Running Shoes\ndescription: A buyer's guide\ndate: 2024-03-01\ncategory: Guides\ntags: [running, shoes]\n---\n\nimport Callout from '../components/Callout'\n\n# Choosing running shoes\n\n<Callout type=\"tip\">Try before you buy</Callout>\n\n```js\nconst ignored = true;\n```\n\nFit matters more than brand.\n";

    async fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, contents).await.unwrap();
    }

    #[test]
    fn splits_frontmatter_from_body() {
        let (yaml, body) = split_frontmatter("---\ntitle: A\n---\nHello\n").unwrap();
        assert_eq!(yaml, "title: A\n");
        assert_eq!(body, "Hello\n");
        assert!(split_frontmatter("title: A\nHello").is_none());
        assert!(split_frontmatter("---\ntitle: A\n").is_none());
    }

    #[test]
    fn parses_article_and_counts_prose_words() {
        let article = parse_article(Path::new("guides/running-shoes.mdx"), ARTICLE).unwrap();
        assert_eq!(article.slug, "running-shoes");
        assert_eq!(article.frontmatter.title, "Choosing Running Shoes");
        assert_eq!(article.frontmatter.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(article.frontmatter.tags, ["running", "shoes"]);
        // "Choosing running shoes" + "Try before you buy" + "Fit matters more than brand."
        assert_eq!(article.stats.word_count, 12);
        assert_eq!(article.stats.reading_time_minutes, 1);
    }

    #[test]
    fn frontmatter_slug_wins_over_file_name() {
        let raw = "---\ntitle: A\nslug: custom\n---\nbody";
        assert_eq!(parse_article(Path::new("x.md"), raw).unwrap().slug, "custom");
    }

    #[test]
    fn missing_title_is_rejected() {
        let err = parse_article(Path::new("x.md"), "---\ndescription: d\n---\nbody").unwrap_err();
        assert!(matches!(err, ContentError::MissingTitle { .. }));
    }

    #[test]
    fn reading_time_rounds_up() {
        let body = "word ".repeat(401);
        let stats = compute_stats(&body);
        assert_eq!(stats.word_count, 401);
        assert_eq!(stats.reading_time_minutes, 3);
        assert_eq!(compute_stats("").reading_time_minutes, 1);
    }

    #[tokio::test]
    async fn library_lists_published_articles_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "guides/running-shoes.mdx", ARTICLE).await;
        write(dir.path(), "news.md", "---\ntitle: Store News\ndate: 2024-05-01\ncategory: News\ntags: [shoes]\n---\nWe moved.").await;
        write(dir.path(), "draft.md", "---\ntitle: Draft\ndraft: true\n---\nSecret.").await;
        write(dir.path(), "broken.md", "no frontmatter here").await;
        write(dir.path(), "notes.txt", "---\ntitle: Ignored\n---\n").await;

        let library = ContentLibrary::new(dir.path());
        let all = library.list(&ArticleFilter::default()).await.unwrap();
        let slugs: Vec<&str> = all.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, ["news", "running-shoes"]);

        let guides = library
            .list(&ArticleFilter { category: Some("guides"), tag: None })
            .await
            .unwrap();
        assert_eq!(guides.len(), 1);

        assert!(library.get("draft").await.unwrap().is_none());
        assert!(library.get("news").await.unwrap().is_some());

        let tags = library.tags().await.unwrap();
        assert_eq!(tags[0], TermCount { name: "shoes".into(), count: 2 });
        let categories = library.categories().await.unwrap();
        assert_eq!(categories.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_yields_no_articles() {
        let library = ContentLibrary::new("/definitely/not/here");
        assert!(library.list(&ArticleFilter::default()).await.unwrap().is_empty());
    }
}
