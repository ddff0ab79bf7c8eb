//! Listing extraction from vuokraovi.com result pages.
//!
//! Every field is filled by an independent rule. A rule that finds nothing
//! leaves its field empty; extraction itself never fails.

use crate::models::Listing;
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Listings and pagination found on one result page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub listings: Vec<Listing>,
    pub next_page: Option<String>,
}

struct Selectors {
    container: Selector,
    page_message: Selector,
    image: Selector,
    price: Selector,
    details_item: Selector,
    availability: Selector,
    link: Selector,
    next_page: Selector,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid selector {css:?}: {err}"))
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    container: selector(".list-item-container"),
    page_message: selector(".error-message, .no-results-message"),
    image: selector(".col-1 img"),
    price: selector("span.price"),
    details_item: selector(".col-2 .list-unstyled li"),
    availability: selector(".showing-lease-container li"),
    link: selector("a.list-item-link"),
    next_page: selector("link[rel='next']"),
});

/// Area unit that marks the size entry of the details list
const AREA_UNIT: &str = "m²";

type Rule = fn(ElementRef<'_>, &str, &mut Listing);

/// Applied in order; the link rule must run last because its address
/// fallback only fills what the image rule left empty.
const RULES: &[Rule] = &[
    address_from_image,
    price,
    size_and_rooms,
    availability,
    link_and_fallback_address,
];

/// Parse a full result page
pub fn parse_page(html: &str, base_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        listings: extract_listings(&document, base_url),
        next_page: next_page_url(&document, base_url),
    }
}

/// Extract every listing container in document order.
///
/// Containers are returned regardless of completeness; filtering unusable
/// records is the caller's job.
pub fn extract_listings(document: &Html, base_url: &str) -> Vec<Listing> {
    let containers: Vec<ElementRef<'_>> = document.select(&SELECTORS.container).collect();

    if containers.is_empty() {
        warn!("No rental listings found in the HTML document");
        let message = collect_text(document.select(&SELECTORS.page_message));
        if !message.is_empty() {
            warn!(%message, "Message from page");
        }
        return Vec::new();
    }

    containers
        .into_iter()
        .enumerate()
        .map(|(idx, container)| {
            let mut listing = Listing::default();
            for rule in RULES {
                rule(container, base_url, &mut listing);
            }
            debug!(index = idx, link = %listing.link, "extracted listing");
            listing
        })
        .collect()
}

/// The last `<link rel="next">` on the page, resolved against `base_url`
pub fn next_page_url(document: &Html, base_url: &str) -> Option<String> {
    document
        .select(&SELECTORS.next_page)
        .filter_map(|el| el.value().attr("href"))
        .last()
        .map(|href| resolve_href(href, base_url))
}

/// Absolute hrefs pass through, everything else is appended to `base_url`
pub fn resolve_href(href: &str, base_url: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{base_url}{href}")
    }
}

fn collect_text<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> String {
    elements
        .flat_map(|el| el.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn address_from_image(container: ElementRef<'_>, _base_url: &str, listing: &mut Listing) {
    // Later qualifying images overwrite earlier ones
    for img in container.select(&SELECTORS.image) {
        let Some(alt) = img.value().attr("alt") else {
            continue;
        };
        if alt.len() > 5 && !alt.to_lowercase().contains("icon") {
            listing.address = alt.to_string();
            listing.title = alt.split(',').next().unwrap_or_default().trim().to_string();
        }
    }
}

fn price(container: ElementRef<'_>, _base_url: &str, listing: &mut Listing) {
    listing.price = collect_text(container.select(&SELECTORS.price));
}

fn size_and_rooms(container: ElementRef<'_>, _base_url: &str, listing: &mut Listing) {
    let mut items = container.select(&SELECTORS.details_item);

    // e.g. "kerrostalo, 34 m²"
    if let Some(first) = items.next() {
        let text = collect_text(std::iter::once(first));
        if text.contains(AREA_UNIT) {
            if let Some((_, size)) = text.split_once(',') {
                listing.size = size.trim().to_string();
            }
        }
    }

    // e.g. "1h + alk + kt"
    if let Some(second) = items.next() {
        listing.rooms = collect_text(std::iter::once(second));
    }
}

fn availability(container: ElementRef<'_>, _base_url: &str, listing: &mut Listing) {
    listing.available_from = collect_text(container.select(&SELECTORS.availability));
}

fn link_and_fallback_address(container: ElementRef<'_>, base_url: &str, listing: &mut Listing) {
    let Some(href) = container
        .select(&SELECTORS.link)
        .next()
        .and_then(|el| el.value().attr("href"))
    else {
        return;
    };

    listing.link = resolve_href(href, base_url);
    if listing.address.is_empty() {
        address_from_link(listing);
    }
}

/// Detail pages live at `/vuokra-asunto/{city}/{district}/{type}/{id}`
fn address_from_link(listing: &mut Listing) {
    let Ok(parsed) = url::Url::parse(&listing.link) else {
        return;
    };
    let segments: Vec<&str> = parsed.path().trim_matches('/').split('/').collect();
    if segments.len() < 4 {
        return;
    }

    let city = title_case(&decode_segment(segments[1]));
    let district = title_case(&decode_segment(segments[2]));
    if listing.title.is_empty() {
        listing.title = district.clone();
    }
    listing.address = format!("{district}, {city}");
}

/// `Url` keeps the path percent-encoded; place names need the decoded text
fn decode_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// Upper-case the first letter of every word, ASCII letters only.
///
/// Words are delimited by whitespace and by ASCII characters other than
/// letters, digits and `_`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = is_word_separator(c);
    }
    out
}

fn is_word_separator(c: char) -> bool {
    if c.is_ascii() {
        !(c.is_ascii_alphanumeric() || c == '_')
    } else {
        c.is_whitespace()
    }
}
