use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

const USER_AGENT: &str = "creel";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed RSS document: channel metadata plus its items, already
/// entity-unescaped. Items are transient; the ingestion cycle consumes them
/// immediately and never stores them as-is.
#[derive(Debug, Clone, Default)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

#[derive(Debug, Clone, Default)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw publish-date string, e.g. `Mon, 06 Sep 2021 12:00:00 +0000`.
    /// Parsing is the ingestion cycle's job, not the fetcher's.
    pub pub_date: String,
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Single GET against `url`, no retries. Transport failures and non-2xx
    /// responses surface as network errors, a body that is not well-formed
    /// RSS as a parse error.
    pub async fn fetch(&self, url: &str) -> Result<RssFeed> {
        debug!("fetching feed from {}", url);
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse raw RSS XML into the channel/item tree. Entity unescaping happens
/// exactly once, here at the parse boundary.
pub fn parse_feed(xml: &[u8]) -> Result<RssFeed> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut feed = RssFeed::default();
    let mut current_item: Option<RssItem> = None;
    let mut saw_channel = false;
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "channel" {
                    saw_channel = true;
                }
                if name == "item" {
                    current_item = Some(RssItem::default());
                }
                stack.push(name);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "item" {
                    if let Some(item) = current_item.take() {
                        feed.items.push(item);
                    }
                }
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    // Tolerate entities quick-xml does not know about rather
                    // than failing the whole feed.
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                record_text(&stack, &mut feed, &mut current_item, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                record_text(&stack, &mut feed, &mut current_item, &text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Parse(format!("malformed XML: {}", e))),
        }
        buf.clear();
    }

    if !saw_channel {
        return Err(Error::Parse("document has no RSS channel".to_string()));
    }

    Ok(feed)
}

/// Assign `text` to the field named by the top of the element stack,
/// channel-level or item-level depending on where we are.
fn record_text(
    stack: &[String],
    feed: &mut RssFeed,
    current_item: &mut Option<RssItem>,
    text: &str,
) {
    let (Some(element), Some(parent)) = (stack.last(), stack.len().checked_sub(2).map(|i| &stack[i]))
    else {
        return;
    };

    if parent == "item" {
        if let Some(item) = current_item {
            match element.as_str() {
                "title" => item.title.push_str(text),
                "link" => item.link.push_str(text),
                "description" => item.description.push_str(text),
                "pubDate" => item.pub_date.push_str(text),
                _ => {}
            }
        }
    } else if parent == "channel" {
        match element.as_str() {
            "title" => feed.title.push_str(text),
            "link" => feed.link.push_str(text),
            "description" => feed.description.push_str(text),
            _ => {}
        }
    }
}
