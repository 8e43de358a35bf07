//! HTML rendering of a conversation.
//!
//! The `conversation` template is compiled in with [maud](https://maud.lambda.xyz/),
//! so message text is always escaped. Only the stylesheet is loaded at run time,
//! and only when the user supplies one.

use crate::error::TemplateError;
use crate::view::ViewRecord;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

const CSS_STATIC: &str = include_str!("../static/style.css");

/// Extensions rendered inline as `<img>`; compared case-insensitively.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "gif", "bmp", "tiff"];

const SEPARATOR_FORMAT: &str = "%A, %B %-d, %Y %-I:%M %p";
const TITLE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run-scoped values bound into the template next to the records.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    /// Account the conversation is with, shown in the page header.
    pub handle: &'a str,
    pub show_line_numbers: bool,
    /// Replaces the embedded stylesheet.
    pub stylesheet: Option<&'a Path>,
}

/// Render the full HTML document.
pub fn render(views: &[ViewRecord], options: &RenderOptions<'_>) -> Result<String, TemplateError> {
    let css = load_stylesheet(options.stylesheet)?;
    Ok(conversation(views, options, &css).into_string())
}

fn load_stylesheet(path: Option<&Path>) -> Result<Cow<'static, str>, TemplateError> {
    match path {
        None => Ok(Cow::Borrowed(CSS_STATIC)),
        Some(p) => fs::read_to_string(p)
            .map(Cow::Owned)
            .map_err(|source| TemplateError::Load {
                path: p.to_path_buf(),
                source,
            }),
    }
}

fn conversation(views: &[ViewRecord], options: &RenderOptions<'_>, css: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { "Messages with " (options.handle) }
                style { (PreEscaped(css)) }
            }
            body {
                header.conversation-header {
                    h1 { (options.handle) }
                }
                main.conversation {
                    @if views.is_empty() {
                        p.empty { "No messages found." }
                    }
                    @for view in views {
                        (message(view, options.show_line_numbers))
                    }
                }
            }
        }
    }
}

fn message(view: &ViewRecord, show_line_numbers: bool) -> Markup {
    let ts = view.timestamp();
    let class = if view.is_from_me() {
        "message from-me"
    } else {
        "message from-them"
    };
    html! {
        @if view.show_date_separator {
            div.date-separator { (ts.format(SEPARATOR_FORMAT).to_string()) }
        }
        div class=(class) title=(ts.format(TITLE_FORMAT).to_string()) {
            @if show_line_numbers {
                span.row-number { (view.row_number) }
            }
            div.bubble {
                @match attachment_fragment(view) {
                    Some(fragment) => { (fragment) }
                    None => { (view.text()) }
                }
            }
        }
    }
}

/// True when `path` has one of the inline image extensions.
pub fn is_image(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}

/// Markup for a message whose attachment was copied: an inline image or a link
/// labelled with the extension, followed by the message text.
///
/// `None` when the record has no copied attachment; such records render as text.
pub fn attachment_fragment(view: &ViewRecord) -> Option<Markup> {
    let path = view.attachment_output_path.as_deref()?;

    let fragment = if is_image(path) {
        html! {
            img src=(path);
            br;
            (view.text())
        }
    } else {
        let label = match Path::new(path).extension() {
            Some(ext) => format!(".{} attachment", ext.to_string_lossy()),
            None => "attachment".to_string(),
        };
        html! {
            a href=(path) { (label) }
            br;
            (view.text())
        }
    };
    Some(fragment)
}
