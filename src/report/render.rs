use crate::report::{Report, chinese_long_date};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::LazyLock;
use url::Url;

pub const CARD_BACKGROUND: &str = "#fffbf7";
const FOOTER_SOURCE_LIMIT: usize = 5;

static IMAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").expect("valid image pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    SectionHeading { text: String },
    ItemHeading { text: String },
    ListItem { text: String },
    Image { alt: String, url: String },
    Spacer,
    Paragraph { text: String },
}

/// Classifies a single line. Rules are checked in order and the first match
/// wins; nothing depends on neighbouring lines.
pub fn classify_line(line: &str) -> Block {
    if let Some(text) = line.strip_prefix("## ") {
        return Block::SectionHeading {
            text: text.to_string(),
        };
    }

    if let Some(text) = line.strip_prefix("### ") {
        return Block::ItemHeading {
            text: text.to_string(),
        };
    }

    if let Some(text) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
    {
        return Block::ListItem {
            text: text.to_string(),
        };
    }

    if let Some(captures) = IMAGE_PATTERN.captures(line) {
        return Block::Image {
            alt: captures[1].to_string(),
            url: captures[2].to_string(),
        };
    }

    if line.trim().is_empty() {
        return Block::Spacer;
    }

    Block::Paragraph {
        text: line.to_string(),
    }
}

pub fn render_blocks(content: &str) -> Vec<Block> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(classify_line)
        .collect()
}

/// Rebuilds markup that classifies back into the same blocks.
pub fn source_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::SectionHeading { text } => format!("## {text}"),
            Block::ItemHeading { text } => format!("### {text}"),
            Block::ListItem { text } => format!("- {text}"),
            Block::Image { alt, url } => format!("![{alt}]({url})"),
            Block::Spacer => String::new(),
            Block::Paragraph { text } => text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn terminal_text(report: &Report) -> String {
    let mut output = String::new();
    let date = chinese_long_date(report.local_date());

    let _ = writeln!(output, "朝 闻 · {date}");
    let _ = writeln!(output, "热点 • 深度 • 洞察");

    for block in render_blocks(&report.content) {
        let _ = match block {
            Block::SectionHeading { text } => writeln!(output, "\n■ {text}\n"),
            Block::ItemHeading { text } => writeln!(output, "● {text}"),
            Block::ListItem { text } => writeln!(output, "  · {text}"),
            Block::Image { alt, url } => writeln!(output, "  [图片] {alt} <{url}>"),
            Block::Spacer => writeln!(output),
            Block::Paragraph { text } => writeln!(output, "{text}"),
        };
    }

    if !report.sources.is_empty() {
        let _ = writeln!(output, "\n来源:");
        for source in &report.sources {
            let _ = writeln!(output, "- {} ({})", source.title, source.uri);
        }
    }

    output
}

#[derive(Debug, Clone)]
pub struct CardOptions {
    pub background: String,
    /// Appended as a query parameter to every remote image so the rasterizer
    /// cannot reuse a stale cached copy.
    pub cache_bust: Option<i64>,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            background: CARD_BACKGROUND.to_string(),
            cache_bust: None,
        }
    }
}

impl CardOptions {
    pub fn for_export(background: &str) -> Self {
        Self {
            background: background.to_string(),
            cache_bust: Some(Utc::now().timestamp_millis()),
        }
    }
}

pub fn card_html(report: &Report, options: &CardOptions) -> String {
    let date = chinese_long_date(report.local_date());
    let body = render_blocks(&report.content)
        .iter()
        .map(|block| block_html(block, options.cache_bust))
        .collect::<Vec<_>>()
        .join("\n");
    let source_tags = report
        .sources
        .iter()
        .take(FOOTER_SOURCE_LIMIT)
        .map(|source| format!("<span class=\"source\">{}</span>", escape_html(&source.title)))
        .collect::<Vec<_>>()
        .join("");

    format!(
        r#"<!doctype html>
<html lang="zh-CN">
<head>
<meta charset="utf-8">
<title>朝闻 · {date}</title>
<style>
body {{ margin: 0; background: {background}; font-family: "Noto Serif SC", "Songti SC", serif; color: #1e293b; }}
.card {{ max-width: 768px; margin: 0 auto; background: {background}; }}
.band {{ height: 8px; background: #991b1b; }}
.masthead {{ background: #fef2f2; border-bottom: 4px solid #991b1b; padding: 48px; text-align: center; }}
.masthead h1 {{ font-size: 64px; font-weight: 900; color: #7f1d1d; margin: 0 0 16px; letter-spacing: -0.02em; }}
.masthead .motto {{ color: #991b1b; letter-spacing: 0.3em; border-top: 1px solid #fecaca; border-bottom: 1px solid #fecaca; display: inline-block; padding: 8px 32px; }}
.masthead .date {{ color: #b91c1c; margin-top: 16px; }}
.content {{ padding: 48px; min-height: 600px; font-size: 18px; line-height: 1.7; }}
.content h2 {{ font-size: 28px; font-weight: 900; color: #7f1d1d; border-left: 4px solid #b91c1c; padding-left: 16px; margin: 40px 0 24px; line-height: 1; }}
.content h3 {{ font-size: 20px; font-weight: 700; color: #0f172a; margin: 24px 0 8px; }}
.content h3::before {{ content: "●"; color: #dc2626; margin-right: 8px; }}
.content li {{ list-style: none; margin: 0 0 8px 24px; color: #334155; text-align: justify; }}
.content p {{ margin: 0 0 8px; color: #334155; text-align: justify; }}
.content .spacer {{ height: 12px; }}
.content figure {{ margin: 16px 0; border-radius: 8px; overflow: hidden; }}
.content figure img {{ width: 100%; height: auto; object-fit: cover; }}
.content figcaption {{ font-size: 12px; color: #64748b; text-align: center; margin-top: 4px; }}
.footer {{ background: #171717; color: #a3a3a3; padding: 32px; text-align: center; border-top: 4px solid #991b1b; }}
.footer .source {{ display: inline-block; font-size: 10px; padding: 4px 8px; margin: 0 4px 8px; border: 1px solid #404040; border-radius: 4px; color: #737373; }}
.footer .seal {{ width: 48px; height: 48px; margin: 16px auto 8px; background: #991b1b; color: #fff; border-radius: 4px; font-size: 20px; font-weight: 700; line-height: 48px; }}
.footer .mark {{ font-size: 12px; letter-spacing: 0.3em; }}
</style>
</head>
<body>
<div class="card">
<div class="band"></div>
<header class="masthead">
<h1>朝 闻</h1>
<div class="motto">热点 • 深度 • 洞察</div>
<p class="date">{date}</p>
</header>
<main class="content">
{body}
</main>
<footer class="footer">
<div>{source_tags}</div>
<div class="seal">朝</div>
<p class="mark">Gemini AI · 每日汇编</p>
</footer>
</div>
</body>
</html>
"#,
        background = escape_html(&options.background),
    )
}

fn block_html(block: &Block, cache_bust: Option<i64>) -> String {
    match block {
        Block::SectionHeading { text } => format!("<h2>{}</h2>", escape_html(text)),
        Block::ItemHeading { text } => format!("<h3>{}</h3>", escape_html(text)),
        Block::ListItem { text } => format!("<li>{}</li>", escape_html(text)),
        Block::Image { alt, url } => {
            let src = match cache_bust {
                Some(stamp) => cache_busted_url(url, stamp),
                None => url.clone(),
            };
            format!(
                "<figure><img src=\"{}\" alt=\"{}\" onerror=\"this.style.display='none'\"><figcaption>{}</figcaption></figure>",
                escape_html(&src),
                escape_html(alt),
                escape_html(alt)
            )
        }
        Block::Spacer => "<div class=\"spacer\"></div>".to_string(),
        Block::Paragraph { text } => format!("<p>{}</p>", escape_html(text)),
    }
}

/// Remote http(s) URLs get a `cacheBust` query parameter; anything else is
/// returned untouched.
pub fn cache_busted_url(raw: &str, stamp: i64) -> String {
    match Url::parse(raw) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
            url.query_pairs_mut()
                .append_pair("cacheBust", &stamp.to_string());
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
