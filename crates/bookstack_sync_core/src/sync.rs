use md5::{Digest, Md5};
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use crate::client::PageWriteApi;
use crate::error::Result;
use crate::frontmatter::{
    FrontMatter, KEY_CHECKSUM, KEY_PAGE_ID, PageMetadata, join_document, split_document,
};

pub const PAGES_ENDPOINT: &str = "/api/pages";

/// Parent container a page is filed under. Serializes as its single payload key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerRef {
    #[serde(rename = "book_id")]
    Book(i64),
    #[serde(rename = "chapter_id")]
    Chapter(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Create,
    Update { page_id: i64 },
}

impl WriteOperation {
    pub fn method(&self) -> Method {
        match self {
            Self::Create => Method::POST,
            Self::Update { .. } => Method::PUT,
        }
    }

    /// API path relative to the server URL.
    pub fn path(&self) -> String {
        match self {
            Self::Create => PAGES_ENDPOINT.to_string(),
            Self::Update { page_id } => format!("{PAGES_ENDPOINT}/{page_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub markdown: String,
    #[serde(flatten)]
    pub container: Option<ContainerRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWriteRequest {
    pub operation: WriteOperation,
    pub payload: PagePayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    UpToDate,
    Write(PageWriteRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub checksum: String,
    pub stored_checksum: Option<String>,
    pub page_id: Option<i64>,
    pub action: PlannedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub id: Option<i64>,
    pub checksum: String,
    pub updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub outcome: SyncOutcome,
    /// Rewritten document; `None` when the page was already up to date.
    pub document: Option<String>,
    pub request_count: usize,
}

/// Lowercase hex MD5 of the body.
pub fn content_checksum(body: &str) -> String {
    let digest = Md5::digest(body.as_bytes());
    let mut output = String::with_capacity(32);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// A positive `chapter_id` wins over a positive `book_id`.
pub fn select_container(metadata: &PageMetadata) -> Option<ContainerRef> {
    let mut container = None;
    if let Some(book_id) = metadata.book_id.filter(|id| *id > 0) {
        container = Some(ContainerRef::Book(book_id));
    }
    if let Some(chapter_id) = metadata.chapter_id.filter(|id| *id > 0) {
        container = Some(ContainerRef::Chapter(chapter_id));
    }
    container
}

pub fn select_operation(metadata: &PageMetadata) -> WriteOperation {
    match metadata.page_id {
        Some(page_id) if page_id > 0 => WriteOperation::Update { page_id },
        _ => WriteOperation::Create,
    }
}

/// Decide what a sync of `body` would do without touching the network.
pub fn plan(body: &str, front_matter: &FrontMatter) -> SyncPlan {
    let metadata = front_matter.page_metadata();
    debug!(
        book_id = ?metadata.book_id,
        chapter_id = ?metadata.chapter_id,
        page_id = ?metadata.page_id,
        page_name = ?metadata.page_name,
        checksum = ?metadata.checksum,
        "read page metadata"
    );
    let checksum = content_checksum(body);

    let action = if metadata.checksum.as_deref() == Some(checksum.as_str()) {
        PlannedAction::UpToDate
    } else {
        PlannedAction::Write(PageWriteRequest {
            operation: select_operation(&metadata),
            payload: PagePayload {
                name: metadata.page_name.clone(),
                markdown: body.to_string(),
                container: select_container(&metadata),
            },
        })
    };

    SyncPlan {
        checksum,
        stored_checksum: metadata.checksum,
        page_id: metadata.page_id,
        action,
    }
}

/// Compare the body against the stored checksum and write the page when it changed.
pub fn decide<A: PageWriteApi>(
    body: &str,
    front_matter: &FrontMatter,
    api: &mut A,
) -> Result<SyncOutcome> {
    let plan = plan(body, front_matter);
    match plan.action {
        PlannedAction::UpToDate => {
            debug!(checksum = %plan.checksum, "page is up to date, skipping write");
            Ok(SyncOutcome {
                id: plan.page_id,
                checksum: plan.checksum,
                updated: false,
            })
        }
        PlannedAction::Write(request) => {
            debug!(
                method = %request.operation.method(),
                path = %request.operation.path(),
                "writing page"
            );
            let page = api.write_page(&request)?;
            debug!(id = page.id, name = ?page.name, "page written");
            Ok(SyncOutcome {
                id: Some(page.id),
                checksum: plan.checksum,
                updated: true,
            })
        }
    }
}

/// Merge the outcome's id and checksum into the front matter and re-render the document.
pub fn apply_outcome(
    front_matter: &FrontMatter,
    body: &str,
    outcome: &SyncOutcome,
) -> Result<String> {
    let mut merged = front_matter.clone();
    if let Some(id) = outcome.id {
        merged.insert(KEY_PAGE_ID, id);
    }
    merged.insert(KEY_CHECKSUM, outcome.checksum.as_str());
    join_document(body, &merged)
}

/// Parse, sync and rewrite a whole document. On error nothing is rewritten.
pub fn publish_document<A: PageWriteApi>(document: &str, api: &mut A) -> Result<PublishReport> {
    let (front_matter, body) = split_document(document)?;
    let outcome = decide(body, &front_matter, api)?;
    let document = if outcome.updated {
        Some(apply_outcome(&front_matter, body, &outcome)?)
    } else {
        None
    };
    Ok(PublishReport {
        outcome,
        document,
        request_count: api.request_count(),
    })
}
