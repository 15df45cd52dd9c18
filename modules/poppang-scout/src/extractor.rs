//! Caption → CandidateEvent extraction.
//!
//! Captions are batched into one prompt per batch. Oracle output is untrusted:
//! anything that does not parse yields no candidates for that batch, and each
//! parsed object is validated on its own.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use poppang_common::{CandidateEvent, ExtractionConfig, PoppangError, Post, Vocabulary};

use crate::retry::with_retry;
use crate::run_log::{EventKind, RunLog};
use crate::stats::RunStats;
use crate::traits::{ImageFetcher, TextOracle};

const SYSTEM_PROMPT: &str = "너는 텍스트에서 구조화된 정보를 추출하는 전문가야.";

/// Fields every candidate must carry, as named in the prompt.
const REQUIRED_FIELDS: [&str; 7] = [
    "name",
    "start_date",
    "end_date",
    "address",
    "region",
    "caption_summary",
    "categories",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-가-힣]").unwrap());

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// `(post index, caption)` for every post with a non-empty caption.
pub fn sections(posts: &[Post]) -> Vec<(usize, String)> {
    posts
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.caption.trim().is_empty())
        .map(|(i, p)| (i, p.caption.clone()))
        .collect()
}

pub fn build_prompt(sections: &[(usize, String)], vocab: &Vocabulary) -> String {
    let body = sections
        .iter()
        .map(|(idx, caption)| format!("[section {idx}]\n{caption}"))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let categories = vocab.category_names().collect::<Vec<_>>().join(", ");
    let required = REQUIRED_FIELDS.join(", ");

    format!(
        r#"아래에 여러 개의 섹션 텍스트가 주어집니다. 각 섹션에는 팝업 이벤트가 하나 이상 있을 수 있습니다.
각 팝업 이벤트마다 아래 소문자 키만 가진 객체를 만들고, 전체를 JSON 배열 하나로만 반환하세요.

- name: 팝업 이름 또는 행사명
- start_date: 시작 날짜 (YYYY-MM-DD)
- end_date: 종료 날짜 (YYYY-MM-DD)
- open_time: 운영 시작 시간 (HH:MM)
- close_time: 운영 종료 시간 (HH:MM)
- address: 도로명 주소 또는 건물명. 주소를 찾을 수 없으면 그 이벤트는 넣지 마세요.
- region: 지역명 (예: 서울, 부산, 성남). 없으면 그 이벤트는 넣지 마세요.
- geocoding_query: 지오코딩 검색용 짧은 명사구
    1) region을 맨 앞에 둡니다.
    2) 건물명이나 공간명 같은 지명 요소만 붙입니다. (예: "성남 현대백화점 판교")
    3) 층수(B1, 2F, 지하 1층), 방향(앞, 근처, 맞은편)과 조사는 뺍니다.
    4) 브랜드명, 팝업 이름, 아티스트나 제품 이름은 뺍니다.
    5) 지역명만 단독으로 쓰지 않습니다.
- section: 이 이벤트가 나온 섹션 번호 (정수)
- caption_summary: 원문을 바탕으로 한 6~10줄 게시글. 위에는 이름, 위치, 일정, 운영시간을,
  아래에는 분위기와 전시·체험 내용을 3줄 이상 씁니다. 줄 사이에는 \n을 넣습니다.
- categories: 다음 목록에서 1개 이상 3개 이하를 배열로 고릅니다. 맞는 것이 정말 없을 때만 "{catch_all}"를 씁니다.
  [{categories}]

필수 필드: {required}. 하나라도 비면 그 이벤트는 빼세요.
설명 없이 JSON 배열만 출력하세요.

{body}"#,
        catch_all = vocab.catch_all,
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One object from the oracle's array, fields trimmed, blanks treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCandidate {
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub geocoding_query: Option<String>,
    pub caption_summary: Option<String>,
    /// `None` when the key is absent; an empty list is kept as-is.
    pub categories: Option<Vec<String>>,
    pub section: Option<usize>,
}

/// Parse the oracle's free text into raw candidates.
///
/// Output with no JSON array, or an array that is not valid JSON, is a
/// `Schema` error. Non-object array items are ignored.
pub fn parse_response(text: &str) -> Result<Vec<RawCandidate>, PoppangError> {
    let json = ai_client::extract_json_array(text).ok_or_else(|| {
        PoppangError::Schema(format!(
            "no JSON array in response: {:?}",
            ai_client::truncate_to_char_boundary(text, 200)
        ))
    })?;
    let items: Vec<Value> = serde_json::from_str(json).map_err(|e| {
        PoppangError::Schema(format!(
            "{e}: {:?}",
            ai_client::truncate_to_char_boundary(json, 200)
        ))
    })?;

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(raw_candidate)
        .collect())
}

fn raw_candidate(obj: &Map<String, Value>) -> RawCandidate {
    RawCandidate {
        name: string_field(obj, "name"),
        start_date: string_field(obj, "start_date"),
        end_date: string_field(obj, "end_date"),
        open_time: string_field(obj, "open_time"),
        close_time: string_field(obj, "close_time"),
        address: string_field(obj, "address"),
        region: string_field(obj, "region"),
        geocoding_query: string_field(obj, "geocoding_query"),
        caption_summary: string_field(obj, "caption_summary"),
        categories: obj
            .get("categories")
            .or_else(|| obj.get("recommend"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        section: obj.get("section").and_then(|v| match v {
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validate a parsed object against its source post and map categories to ids.
pub fn to_candidate(
    raw: RawCandidate,
    post: &Post,
    vocab: &Vocabulary,
) -> Result<CandidateEvent, PoppangError> {
    let names = raw
        .categories
        .unwrap_or_else(|| vec![vocab.catch_all.clone()]);
    let categories = vocab.category_ids(&names);

    let missing: Vec<&str> = [
        ("name", raw.name.is_none()),
        ("start_date", raw.start_date.is_none()),
        ("end_date", raw.end_date.is_none()),
        ("address", raw.address.is_none()),
        ("region", raw.region.is_none()),
        ("caption_summary", raw.caption_summary.is_none()),
        ("categories", categories.is_empty()),
    ]
    .into_iter()
    .filter_map(|(field, absent)| absent.then_some(field))
    .collect();
    if !missing.is_empty() {
        return Err(PoppangError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok(CandidateEvent {
        name: raw.name.unwrap_or_default(),
        start_date: raw.start_date.unwrap_or_default(),
        end_date: raw.end_date.unwrap_or_default(),
        open_time: raw.open_time,
        close_time: raw.close_time,
        address: raw.address.unwrap_or_default(),
        region: raw.region.unwrap_or_default(),
        geocoding_query: raw.geocoding_query,
        caption_summary: raw.caption_summary.unwrap_or_default(),
        categories,
        source_section_index: raw.section.unwrap_or_default(),
        post_id: post.id.clone(),
        post_url: post.permalink.clone(),
        caption: post.caption.clone(),
        media_type: post.media_type,
        image_urls: post.media_urls.clone(),
        image_paths: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Image download helpers
// ---------------------------------------------------------------------------

/// File-name-safe form of an event name.
pub fn slugify(text: &str) -> String {
    let text = text.trim();
    let slug = WHITESPACE.replace_all(text, "_");
    let slug = NON_SLUG.replace_all(&slug, "");
    if slug.is_empty() {
        "no_name".to_string()
    } else {
        slug.into_owned()
    }
}

/// Extension to store a URL's image under, or `None` for formats skipped by policy.
pub fn image_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "webp" => None,
        "" | "heic" => Some(".jpg".to_string()),
        other => Some(format!(".{other}")),
    }
}

// ---------------------------------------------------------------------------
// ExtractionEngine
// ---------------------------------------------------------------------------

pub struct ExtractionEngine<'a> {
    oracle: &'a dyn TextOracle,
    images: &'a dyn ImageFetcher,
    vocab: &'a Vocabulary,
    config: &'a ExtractionConfig,
    download: bool,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(
        oracle: &'a dyn TextOracle,
        images: &'a dyn ImageFetcher,
        vocab: &'a Vocabulary,
        config: &'a ExtractionConfig,
    ) -> Self {
        Self {
            oracle,
            images,
            vocab,
            config,
            download: config.download_images,
        }
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    pub async fn extract(
        &self,
        posts: &[Post],
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Vec<CandidateEvent> {
        let sections = sections(posts);
        stats.captions = sections.len() as u32;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let placeholder = Post::default();
        let mut events = Vec::new();

        for (batch_no, batch) in sections.chunks(self.config.batch_size.max(1)).enumerate() {
            stats.batches += 1;
            let prompt = build_prompt(batch, self.vocab);

            let response = with_retry("extraction", self.config.retry, || {
                self.oracle
                    .complete(SYSTEM_PROMPT, &prompt, self.config.max_tokens)
            })
            .await;

            let text = match response {
                Ok(text) => text,
                Err(e) => {
                    warn!(batch = batch_no, error = %e, "Extraction batch failed, skipping");
                    stats.batches_failed += 1;
                    run_log.log(EventKind::ExtractionBatch {
                        batch: batch_no as u32,
                        sections: batch.len() as u32,
                        candidates: 0,
                        success: false,
                    });
                    continue;
                }
            };

            let raws = parse_response(&text).unwrap_or_else(|e| {
                warn!(batch = batch_no, error = %e, "Unusable extraction response, treating as empty");
                Vec::new()
            });
            stats.candidates_parsed += raws.len() as u32;
            run_log.log(EventKind::ExtractionBatch {
                batch: batch_no as u32,
                sections: batch.len() as u32,
                candidates: raws.len() as u32,
                success: true,
            });
            info!(batch = batch_no, sections = batch.len(), candidates = raws.len(), "Extraction batch");

            for raw in raws {
                let post = raw
                    .section
                    .and_then(|idx| posts.get(idx))
                    .unwrap_or(&placeholder);
                let name = raw.name.clone().unwrap_or_default();

                let candidate = match to_candidate(raw, post, self.vocab) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(name = name.as_str(), error = %e, "Dropping candidate");
                        stats.candidates_invalid += 1;
                        run_log.log(EventKind::CandidateDropped {
                            name,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                let candidate = if self.download {
                    self.download_images(candidate, &stamp, stats, run_log).await
                } else {
                    Some(candidate).filter(|c| !c.image_urls.is_empty())
                };

                match candidate {
                    Some(c) => events.push(c),
                    None => {
                        warn!(name = name.as_str(), "Dropping candidate without images");
                        stats.candidates_without_images += 1;
                        run_log.log(EventKind::CandidateDropped {
                            name,
                            reason: "no usable images".to_string(),
                        });
                    }
                }
            }
        }

        stats.extracted = events.len() as u32;
        info!(extracted = events.len(), "Extraction complete");
        events
    }

    /// Download every image URL of an event. Keeps only URLs that were stored;
    /// returns `None` when none were.
    async fn download_images(
        &self,
        mut event: CandidateEvent,
        stamp: &str,
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Option<CandidateEvent> {
        let post_id = if event.post_id.is_empty() {
            "unknown"
        } else {
            event.post_id.as_str()
        };
        let dir = self.config.image_dir.join(format!("{stamp}_{post_id}"));
        let slug = slugify(&event.name);

        let mut kept = Vec::new();
        let mut paths = Vec::new();
        for url in &event.image_urls {
            match self.download_one(url, &dir, &slug, paths.len() + 1).await {
                Ok(Some(path)) => {
                    stats.images_downloaded += 1;
                    run_log.log(EventKind::ImageDownload {
                        url: url.clone(),
                        success: true,
                    });
                    kept.push(url.clone());
                    paths.push(path);
                }
                Ok(None) => debug!(url = url.as_str(), "Image skipped by policy"),
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "Image download failed");
                    stats.images_failed += 1;
                    run_log.log(EventKind::ImageDownload {
                        url: url.clone(),
                        success: false,
                    });
                }
            }
        }

        event.image_urls = kept;
        event.image_paths = paths;
        (!event.image_paths.is_empty()).then_some(event)
    }

    async fn download_one(
        &self,
        url: &str,
        dir: &Path,
        slug: &str,
        n: usize,
    ) -> Result<Option<PathBuf>> {
        if !url.starts_with("http") {
            return Ok(None);
        }
        let Some(ext) = image_extension(url) else {
            return Ok(None);
        };

        let image = self.images.fetch(url).await?;
        if image.status != 200 {
            bail!("HTTP {}", image.status);
        }
        if let Some(content_type) = image.content_type.as_deref() {
            if !content_type.starts_with("image/") || content_type.starts_with("image/webp") {
                return Ok(None);
            }
        }

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{slug}_{n}{ext}"));
        tokio::fs::write(&path, &image.bytes).await?;
        Ok(Some(path))
    }
}
