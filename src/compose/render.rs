/// HTML rendering of answer messages for the chat widget
///
/// Model replies are Markdown. They are rendered with pulldown-cmark; raw HTML
/// in the reply is shown as text and link targets are limited to web and mail
/// schemes.
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use regex::Regex;

const SAFE_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders messages as a response card, linking known issue keys
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    issue_base_url: Option<String>,
}

impl HtmlRenderer {
    pub fn new(issue_base_url: Option<String>) -> Self {
        Self {
            issue_base_url: issue_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// Render `message`; the text after the last "Summary:" is set apart
    pub fn render(&self, message: &str, keys: &[&str]) -> String {
        let (body, summary) = match message.rfind("Summary:") {
            Some(idx) => (
                &message[..idx],
                Some(message[idx + "Summary:".len()..].trim()),
            ),
            None => (message, None),
        };
        // "**Summary:**" leaves its emphasis markers on both sides of the split
        let (body, summary) = match summary {
            Some(summary) => (
                body.trim_end()
                    .strip_suffix("**")
                    .unwrap_or(body)
                    .trim_end(),
                Some(summary.trim_start_matches('*').trim()),
            ),
            None => (body, None),
        };

        let linker = self.linker(keys);
        let mut html =
            String::from("<div class=\"response-card\"><div class=\"response-content\">");
        html.push_str(&self.markdown(body, linker.as_ref()));
        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            html.push_str("<hr><p class=\"summary\"><strong>Summary:</strong> ");
            html.push_str(&self.inline(summary, linker.as_ref()));
            html.push_str("</p>");
        }
        html.push_str("</div></div>");
        html
    }

    fn linker(&self, keys: &[&str]) -> Option<Regex> {
        self.issue_base_url.as_ref()?;
        if keys.is_empty() {
            return None;
        }
        let alternatives: Vec<String> = keys.iter().map(|k| regex::escape(k)).collect();
        Regex::new(&format!(r"\b({})\b", alternatives.join("|"))).ok()
    }

    fn markdown(&self, text: &str, linker: Option<&Regex>) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);

        let mut events: Vec<Event> = Vec::new();
        // Inside links and code, issue keys are left alone
        let mut plain_depth = 0usize;

        for event in Parser::new_ext(text, options) {
            match event {
                Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
                Event::SoftBreak => events.push(Event::HardBreak),
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    plain_depth += 1;
                    events.push(Event::Start(Tag::Link {
                        link_type,
                        dest_url: safe_url(dest_url),
                        title,
                        id,
                    }));
                }
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    plain_depth += 1;
                    events.push(Event::Start(Tag::Image {
                        link_type,
                        dest_url: safe_url(dest_url),
                        title,
                        id,
                    }));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    plain_depth += 1;
                    events.push(Event::Start(Tag::CodeBlock(kind)));
                }
                Event::End(end @ (TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock)) => {
                    plain_depth = plain_depth.saturating_sub(1);
                    events.push(Event::End(end));
                }
                Event::Text(text) if plain_depth == 0 => match (linker, &self.issue_base_url) {
                    (Some(linker), Some(base)) => link_keys(&mut events, text, linker, base),
                    _ => events.push(Event::Text(text)),
                },
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(text.len() * 2);
        html::push_html(&mut out, events.into_iter());
        out
    }

    /// Render a single paragraph without its `<p>` wrapper
    fn inline(&self, text: &str, linker: Option<&Regex>) -> String {
        let rendered = self.markdown(text, linker);
        let trimmed = rendered.trim_end();
        match trimmed
            .strip_prefix("<p>")
            .and_then(|s| s.strip_suffix("</p>"))
        {
            Some(inner) if !inner.contains("<p>") => inner.to_string(),
            _ => trimmed.to_string(),
        }
    }
}

/// Split `text` around issue keys, turning each key into a link
fn link_keys<'a>(events: &mut Vec<Event<'a>>, text: CowStr<'a>, linker: &Regex, base: &str) {
    let mut last = 0;
    for caps in linker.captures_iter(&text) {
        let Some(m) = caps.get(1) else { continue };
        if m.start() > last {
            events.push(Event::Text(CowStr::from(text[last..m.start()].to_string())));
        }
        let key = m.as_str().to_string();
        events.push(Event::Start(Tag::Link {
            link_type: LinkType::Inline,
            dest_url: CowStr::from(format!("{}/{}", base, key)),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        events.push(Event::Text(CowStr::from(key)));
        events.push(Event::End(TagEnd::Link));
        last = m.end();
    }
    if last == 0 {
        events.push(Event::Text(text));
    } else if last < text.len() {
        events.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lower = url.trim().to_ascii_lowercase();
    let has_scheme = lower
        .split_once(':')
        .map_or(false, |(scheme, _)| !scheme.contains('/'));
    if !has_scheme || SAFE_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        url
    } else {
        CowStr::from("#")
    }
}
