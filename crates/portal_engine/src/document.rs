use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

const DEFAULT_MAX_LINKS: usize = 5_000;

/// What a loaded page exposes to jobs: its title, visible text, outgoing
/// links and the form controls that can be addressed by name or id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDocument {
    pub title: String,
    pub text: String,
    /// Absolute link targets in document order.
    pub hrefs: Vec<String>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub tag: String,
    pub name: Option<String>,
    pub id: Option<String>,
}

impl FormField {
    /// Matches `[name=key]` first, then `#key`.
    pub fn answers_to(&self, key: &str) -> bool {
        self.name.as_deref() == Some(key) || self.id.as_deref() == Some(key)
    }
}

impl PageDocument {
    pub fn parse(html: &str, base_url: Option<&str>) -> Self {
        Self::parse_with_max_links(html, base_url, DEFAULT_MAX_LINKS)
    }

    pub fn parse_with_max_links(html: &str, base_url: Option<&str>, max_links: usize) -> Self {
        let document = Html::parse_document(html);
        let base_url = base_url.and_then(|b| Url::parse(b).ok());
        let mut ctx = WalkContext::new(base_url, max_links);

        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next());
        match body {
            Some(body) => visit_children(body, &mut ctx),
            None => visit_children(document.root_element(), &mut ctx),
        }

        PageDocument {
            title: document_title(&document),
            text: ctx.builder.trim().to_string(),
            hrefs: ctx.hrefs,
            fields: ctx.fields,
        }
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.answers_to(key))
    }
}

fn document_title(document: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut WalkContext) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef, ctx: &mut WalkContext) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "a" => {
            if let Some(href) = element.value().attr("href") {
                ctx.add_href(href);
            }
            visit_children(element, ctx);
        }
        "input" | "textarea" | "select" => {
            ctx.add_field(&tag, element);
            if tag != "input" {
                visit_children(element, ctx);
            }
        }
        "br" => ctx.ensure_newline(),
        "p" | "div" | "section" | "article" | "header" | "footer" | "nav" | "main" | "aside"
        | "figure" | "figcaption" | "form" | "fieldset" | "table" | "tr" | "li" | "ul" | "ol"
        | "dl" | "dt" | "dd" | "blockquote" | "address" | "pre" | "h1" | "h2" | "h3" | "h4"
        | "h5" | "h6" => {
            ctx.ensure_newline();
            visit_children(element, ctx);
            ctx.ensure_newline();
        }
        "td" | "th" => {
            visit_children(element, ctx);
            ctx.append_text(" ");
        }
        "head" | "title" | "script" | "style" | "noscript" | "iframe" | "template" => {}
        _ => visit_children(element, ctx),
    }
}

fn visit_children(element: ElementRef, ctx: &mut WalkContext) {
    for child in element.children() {
        visit_node(child, ctx);
    }
}

/// Resolves an href the way a browser reports `a.href`, except that in-page
/// fragments, bare queries and `javascript:` pseudo-links are dropped.
pub(crate) fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with('?') || lower.starts_with("javascript:") {
        return None;
    }
    if let Ok(url) = Url::parse(trimmed) {
        return Some(url);
    }
    base.and_then(|base| base.join(trimmed).ok())
}

struct WalkContext {
    builder: String,
    hrefs: Vec<String>,
    fields: Vec<FormField>,
    base_url: Option<Url>,
    max_links: usize,
    last_char: Option<char>,
}

impl WalkContext {
    fn new(base_url: Option<Url>, max_links: usize) -> Self {
        Self {
            builder: String::new(),
            hrefs: Vec::new(),
            fields: Vec::new(),
            base_url,
            max_links,
            last_char: None,
        }
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.builder.is_empty()
                    || self.last_char == Some(' ')
                    || self.last_char == Some('\n')
                {
                    continue;
                }
                self.push_char(' ');
            } else {
                self.push_char(ch);
            }
        }
    }

    fn ensure_newline(&mut self) {
        if self.last_char == Some('\n') || self.builder.is_empty() {
            return;
        }
        if self.last_char == Some(' ') {
            self.builder.pop();
        }
        self.push_char('\n');
    }

    fn push_char(&mut self, ch: char) {
        self.builder.push(ch);
        self.last_char = Some(ch);
    }

    fn add_href(&mut self, raw: &str) {
        if self.hrefs.len() >= self.max_links {
            return;
        }
        if let Some(url) = resolve_url(raw, self.base_url.as_ref()) {
            self.hrefs.push(url.into());
        }
    }

    fn add_field(&mut self, tag: &str, element: ElementRef) {
        let attr = |name: &str| {
            element
                .value()
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let (name, id) = (attr("name"), attr("id"));
        if name.is_none() && id.is_none() {
            return;
        }
        self.fields.push(FormField {
            tag: tag.to_string(),
            name,
            id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_skips_head_and_scripts() {
        let doc = PageDocument::parse(
            "<html><head><title> Home </title><style>p{}</style></head>\
             <body><h1>Welcome</h1><script>var x;</script><p>Hello   there</p></body></html>",
            None,
        );
        assert_eq!(doc.title, "Home");
        assert_eq!(doc.text, "Welcome\nHello there");
    }

    #[test]
    fn hrefs_are_absolute_and_pseudo_links_dropped() {
        let doc = PageDocument::parse(
            r##"<body><a href="/d2l/home/1">One</a><a href="#top">Top</a>
               <a href="javascript:void(0)">JS</a><a href="https://other.example/x">X</a></body>"##,
            Some("https://learn.example.edu/d2l/home"),
        );
        assert_eq!(
            doc.hrefs,
            vec![
                "https://learn.example.edu/d2l/home/1".to_string(),
                "https://other.example/x".to_string(),
            ]
        );
    }

    #[test]
    fn fields_answer_to_name_or_id() {
        let doc = PageDocument::parse(
            r#"<form><input name="email"><textarea id="notes"></textarea><input type="submit"></form>"#,
            None,
        );
        assert_eq!(doc.fields.len(), 2);
        assert!(doc.has_field("email"));
        assert!(doc.has_field("notes"));
        assert!(!doc.has_field("password"));
    }

    #[test]
    fn link_cap_is_enforced() {
        let html = (0..4)
            .map(|i| format!(r#"<a href="https://ex.com/{i}">l</a>"#))
            .collect::<String>();
        let doc = PageDocument::parse_with_max_links(&html, None, 2);
        assert_eq!(doc.hrefs.len(), 2);
    }
}
