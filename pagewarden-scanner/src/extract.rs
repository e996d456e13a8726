//! Structural signal extraction.
//!
//! The DOM is walked exactly once by [`observe`], which flattens every node
//! of interest into an [`Observation`]. Each metric is then computed by its
//! own reducer over that list, so the heuristics can be exercised without
//! building a document.

use crate::result::HeadingCounts;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;

/// Keywords that mark a `<form>` as login-like when found in its id, class or name.
const FORM_KEYWORDS: &[&str] = &[
    "login",
    "signin",
    "sign-in",
    "auth",
    "authentication",
    "user",
    "account",
    "credential",
    "password",
    "login-form",
    "signin-form",
    "auth-form",
    "user-form",
];

/// Name/id fragments of a username-like `<input>` inside a form.
const USERNAME_KEYWORDS: &[&str] = &[
    "username", "user", "email", "login", "account", "userid", "user_id", "user-id", "mail",
];

/// Name/id fragments that make any `<input>` login-like on its own.
const INPUT_KEYWORDS: &[&str] = &[
    "password",
    "username",
    "user",
    "email",
    "login",
    "signin",
    "auth",
    "credential",
    "account",
];

/// Identifying attributes of a `<form>`, lowercased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSignals {
    pub ordinal: usize,
    pub id: String,
    pub class: String,
    pub name: String,
}

impl FormSignals {
    pub fn matches_login_keywords(&self) -> bool {
        [&self.id, &self.class, &self.name]
            .iter()
            .any(|value| contains_any(value, FORM_KEYWORDS))
    }
}

/// Attributes of an `<input>`, lowercased, with the ordinal of its enclosing form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSignals {
    pub form: Option<usize>,
    pub input_type: String,
    pub name: String,
    pub id: String,
}

impl InputSignals {
    pub fn is_password(&self) -> bool {
        self.input_type == "password"
    }

    pub fn is_username_like(&self) -> bool {
        self.input_type == "email"
            || contains_any(&self.name, USERNAME_KEYWORDS)
            || contains_any(&self.id, USERNAME_KEYWORDS)
    }

    pub fn is_login_like(&self) -> bool {
        self.input_type == "password"
            || self.input_type == "email"
            || contains_any(&self.name, INPUT_KEYWORDS)
            || contains_any(&self.id, INPUT_KEYWORDS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Doctype as `name public_id system_id`, lowercased.
    Doctype(String),
    Title(String),
    Heading(u8),
    Anchor(String),
    Form(FormSignals),
    Input(InputSignals),
}

/// Everything the analyzer needs from the page body.
#[derive(Debug, Clone, Default)]
pub struct PageSignals {
    pub title: Option<String>,
    pub html_version: String,
    pub headings: HeadingCounts,
    pub hrefs: Vec<String>,
    pub has_login_form: bool,
}

/// Parse `html` and reduce it to [`PageSignals`].
pub fn extract_signals(html: &str) -> PageSignals {
    let document = Html::parse_document(html);
    let observations = observe(&document);

    PageSignals {
        title: first_title(&observations),
        html_version: html_version(&observations),
        headings: heading_counts(&observations),
        hrefs: anchor_hrefs(&observations)
            .into_iter()
            .map(str::to_string)
            .collect(),
        has_login_form: has_login_form(&observations),
    }
}

/// Single pre-order traversal of the document.
pub fn observe(document: &Html) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut forms = HashMap::new();

    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Doctype(doctype) => {
                let text = [doctype.name(), doctype.public_id(), doctype.system_id()]
                    .iter()
                    .filter(|part| !part.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" ");
                observations.push(Observation::Doctype(text.to_lowercase()));
            }
            Node::Element(element) => {
                let attr = |name: &str| element.attr(name).unwrap_or("").to_lowercase();
                match element.name() {
                    "title" => {
                        if let Some(title) = ElementRef::wrap(node) {
                            let text: String = title.text().collect();
                            observations.push(Observation::Title(text.trim().to_string()));
                        }
                    }
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        let level = element.name().as_bytes()[1] - b'0';
                        observations.push(Observation::Heading(level));
                    }
                    "a" => {
                        if let Some(href) = element.attr("href") {
                            observations.push(Observation::Anchor(href.to_string()));
                        }
                    }
                    "form" => {
                        let ordinal = forms.len();
                        forms.insert(node.id(), ordinal);
                        observations.push(Observation::Form(FormSignals {
                            ordinal,
                            id: attr("id"),
                            class: attr("class"),
                            name: attr("name"),
                        }));
                    }
                    "input" => {
                        let form = node
                            .ancestors()
                            .find_map(|ancestor| forms.get(&ancestor.id()).copied());
                        observations.push(Observation::Input(InputSignals {
                            form,
                            input_type: attr("type"),
                            name: attr("name"),
                            id: attr("id"),
                        }));
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    observations
}

pub fn first_title(observations: &[Observation]) -> Option<String> {
    observations.iter().find_map(|obs| match obs {
        Observation::Title(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    })
}

pub fn heading_counts(observations: &[Observation]) -> HeadingCounts {
    let mut counts = HeadingCounts::default();
    for obs in observations {
        if let Observation::Heading(level) = obs {
            counts.record(*level);
        }
    }
    counts
}

/// Anchor targets worth resolving, in document order.
pub fn anchor_hrefs(observations: &[Observation]) -> Vec<&str> {
    observations
        .iter()
        .filter_map(|obs| match obs {
            Observation::Anchor(href) => Some(href.trim()),
            _ => None,
        })
        .filter(|href| is_followable_href(href))
        .collect()
}

fn is_followable_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:"))
}

pub fn has_login_form(observations: &[Observation]) -> bool {
    // (has password input, has username-like input) per form ordinal
    let mut form_fields: HashMap<usize, (bool, bool)> = HashMap::new();

    for obs in observations {
        match obs {
            Observation::Form(form) if form.matches_login_keywords() => return true,
            Observation::Input(input) => {
                if input.is_login_like() {
                    return true;
                }
                if let Some(ordinal) = input.form {
                    let fields = form_fields.entry(ordinal).or_default();
                    fields.0 |= input.is_password();
                    fields.1 |= input.is_username_like();
                    if fields.0 && fields.1 {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }

    false
}

pub fn html_version(observations: &[Observation]) -> String {
    let doctype = observations.iter().find_map(|obs| match obs {
        Observation::Doctype(text) => Some(text.as_str()),
        _ => None,
    });
    detect_html_version(doctype)
}

/// Classify a doctype string. `None` (no doctype node) is treated as HTML5.
pub fn detect_html_version(doctype: Option<&str>) -> String {
    let Some(doctype) = doctype else {
        return "HTML5".to_string();
    };
    let doctype = doctype.trim().to_lowercase();

    if doctype == "html" || doctype == "html about:legacy-compat" {
        return "HTML5".to_string();
    }

    let variant = if doctype.contains("strict") {
        Some("Strict")
    } else if doctype.contains("transitional") {
        Some("Transitional")
    } else if doctype.contains("frameset") {
        Some("Frameset")
    } else {
        None
    };

    let version = match variant {
        Some(variant) if doctype.contains("html 4.01") => format!("HTML 4.01 {}", variant),
        Some(variant) if doctype.contains("xhtml 1.0") => format!("XHTML 1.0 {}", variant),
        _ if doctype.contains("xhtml 1.1") => "XHTML 1.1".to_string(),
        _ if doctype.contains("xhtml") => "XHTML".to_string(),
        _ if doctype.contains("html") => "HTML 4.01".to_string(),
        _ => "HTML5".to_string(),
    };
    version
}

fn contains_any(value: &str, keywords: &[&str]) -> bool {
    !value.is_empty() && keywords.iter().any(|keyword| value.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(html: &str) -> PageSignals {
        extract_signals(html)
    }

    #[test]
    fn test_html5_doctype() {
        let s = signals("<!DOCTYPE html><html><head><title>x</title></head></html>");
        assert_eq!(s.html_version, "HTML5");
    }

    #[test]
    fn test_missing_doctype_is_html5() {
        let s = signals("<html><body><p>no doctype</p></body></html>");
        assert_eq!(s.html_version, "HTML5");
    }

    #[test]
    fn test_html401_strict_doctype() {
        let s = signals(
            r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd"><html></html>"#,
        );
        assert_eq!(s.html_version, "HTML 4.01 Strict");
    }

    #[test]
    fn test_html401_transitional_doctype() {
        let s = signals(
            r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01 Transitional//EN" "http://www.w3.org/TR/html4/loose.dtd"><html></html>"#,
        );
        assert_eq!(s.html_version, "HTML 4.01 Transitional");
    }

    #[test]
    fn test_xhtml_doctypes() {
        assert_eq!(
            detect_html_version(Some(
                "html -//w3c//dtd xhtml 1.0 strict//en http://www.w3.org/tr/xhtml1/dtd/xhtml1-strict.dtd"
            )),
            "XHTML 1.0 Strict"
        );
        assert_eq!(
            detect_html_version(Some(
                "html -//w3c//dtd xhtml 1.0 frameset//en http://www.w3.org/tr/xhtml1/dtd/xhtml1-frameset.dtd"
            )),
            "XHTML 1.0 Frameset"
        );
        assert_eq!(
            detect_html_version(Some(
                "html -//w3c//dtd xhtml 1.1//en http://www.w3.org/tr/xhtml11/dtd/xhtml11.dtd"
            )),
            "XHTML 1.1"
        );
        assert_eq!(
            detect_html_version(Some("html -//w3c//dtd xhtml basic 1.0//en")),
            "XHTML"
        );
    }

    #[test]
    fn test_other_html_doctype_falls_back_to_401() {
        assert_eq!(
            detect_html_version(Some("html -//w3c//dtd html 3.2 final//en")),
            "HTML 4.01"
        );
        assert_eq!(detect_html_version(None), "HTML5");
    }

    #[test]
    fn test_title_is_first_and_trimmed() {
        let s = signals(
            "<html><head><title>  Home Page \n</title><title>Second</title></head></html>",
        );
        assert_eq!(s.title.as_deref(), Some("Home Page"));
    }

    #[test]
    fn test_no_title() {
        let s = signals("<html><body></body></html>");
        assert_eq!(s.title, None);
    }

    #[test]
    fn test_heading_counts() {
        let s = signals(
            "<h1>a</h1><h2>b</h2><h2>c</h2><h3>d</h3><h6>e</h6><h6>f</h6><h6>g</h6>",
        );
        assert_eq!(s.headings.h1, 1);
        assert_eq!(s.headings.h2, 2);
        assert_eq!(s.headings.h3, 1);
        assert_eq!(s.headings.h4, 0);
        assert_eq!(s.headings.h5, 0);
        assert_eq!(s.headings.h6, 3);
    }

    #[test]
    fn test_anchor_filtering() {
        let s = signals(
            r##"
            <a href="/about">About</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">JS</a>
            <a href="JavaScript:alert(1)">JS upper</a>
            <a href="mailto:me@example.com">Mail</a>
            <a href="tel:+123">Call</a>
            <a href="">Empty</a>
            <a>No href</a>
            <a href=" http://other.com/x ">Other</a>
            "##,
        );
        assert_eq!(s.hrefs, vec!["/about", "http://other.com/x"]);
    }

    #[test]
    fn test_login_form_by_fields_without_identifiers() {
        let s = signals(
            r#"<form><input type="email"><input type="password"></form>"#,
        );
        assert!(s.has_login_form);
    }

    #[test]
    fn test_search_form_is_not_login() {
        let s = signals(
            r#"<form class="search-box"><input type="text" name="q"><button>Go</button></form>"#,
        );
        assert!(!s.has_login_form);
    }

    #[test]
    fn test_login_form_by_class() {
        let s = signals(r#"<form class="Account-Panel"><input type="text" name="q"></form>"#);
        assert!(s.has_login_form);
    }

    #[test]
    fn test_bare_input_sets_flag() {
        let s = signals(r#"<div><input type="text" id="signin-name"></div>"#);
        assert!(s.has_login_form);
    }

    #[test]
    fn test_form_rule_pairs_fields_within_same_form() {
        let observations = vec![
            Observation::Form(FormSignals {
                ordinal: 0,
                ..FormSignals::default()
            }),
            Observation::Form(FormSignals {
                ordinal: 1,
                ..FormSignals::default()
            }),
        ];
        assert!(!has_login_form(&observations));

        let username = InputSignals {
            form: Some(0),
            input_type: "text".to_string(),
            name: "mail".to_string(),
            id: String::new(),
        };
        assert!(username.is_username_like());
        assert!(!username.is_login_like());
    }

    #[test]
    fn test_input_records_enclosing_form() {
        let document = Html::parse_document(
            r#"<form id="a"><input name="x"></form><form id="b"><div><input name="y"></div></form><input name="z">"#,
        );
        let forms: Vec<Option<usize>> = observe(&document)
            .into_iter()
            .filter_map(|obs| match obs {
                Observation::Input(input) => Some(input.form),
                _ => None,
            })
            .collect();
        assert_eq!(forms, vec![Some(0), Some(1), None]);
    }
}
