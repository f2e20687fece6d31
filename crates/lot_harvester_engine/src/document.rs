use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::{ClientError, ClientErrorKind, Locator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode a response body into UTF-8: BOM, then the Content-Type charset,
/// then chardetng detection. Malformed input is decoded lossily rather than
/// rejected; the caller decides whether that deserves a warning.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> DecodedHtml {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(&['"', '\''][..]).to_string())
        } else {
            None
        }
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, _, had_errors) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: enc.name().to_string(),
        lossy: had_errors,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// A filled-in form, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub method: FormMethod,
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// A loaded page. Parsing happens on demand so the document can be held
/// across await points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: Url,
    html: String,
}

impl Document {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Outer HTML of the first element matched by `locator`.
    pub fn locate(&self, locator: &Locator) -> Result<Option<String>, ClientError> {
        let doc = Html::parse_document(&self.html);
        let found = match locator {
            Locator::Id(id) => find_by_id(&doc, id),
            Locator::Css(css) => {
                let sel = parse_selector(css)?;
                doc.select(&sel).next()
            }
            Locator::ContainsText { css, text } => {
                let sel = parse_selector(css)?;
                let needle = text.to_ascii_lowercase();
                doc.select(&sel)
                    .find(|el| element_text(el).to_ascii_lowercase().contains(&needle))
            }
        };
        Ok(found.map(|el| el.html()))
    }

    /// Fill the form that owns the input `field_id` with `value`.
    ///
    /// Every other successful control keeps its current value (hidden state
    /// fields included). `trigger_id` names the control that submits the
    /// form: a named submit input contributes its name/value, and an
    /// ASP.NET `__doPostBack` link sets the event target fields.
    pub fn form_submission(
        &self,
        field_id: &str,
        value: &str,
        trigger_id: Option<&str>,
    ) -> Result<FormSubmission, ClientError> {
        let doc = Html::parse_document(&self.html);
        let input = find_by_id(&doc, field_id).ok_or_else(|| {
            ClientError::new(
                ClientErrorKind::FieldNotFound {
                    field_id: field_id.to_string(),
                },
                format!("no element with id {field_id} on {}", self.url),
            )
        })?;
        let input_name = input
            .value()
            .attr("name")
            .unwrap_or(field_id)
            .to_string();

        let form = input
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "form");
        let scope = form.unwrap_or_else(|| doc.root_element());

        let mut fields = collect_controls(scope);
        match fields.iter_mut().find(|(name, _)| *name == input_name) {
            Some(slot) => slot.1 = value.to_string(),
            None => fields.push((input_name, value.to_string())),
        }

        if let Some(trigger) = trigger_id.and_then(|id| find_by_id(&doc, id)) {
            apply_trigger(trigger, &mut fields);
        }

        let method = match form.and_then(|f| f.value().attr("method")) {
            Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };
        let action = match form
            .and_then(|f| f.value().attr("action"))
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            Some(raw) => self.url.join(raw).map_err(|err| {
                ClientError::new(ClientErrorKind::InvalidUrl, format!("form action {raw}: {err}"))
            })?,
            None => self.url.clone(),
        };

        Ok(FormSubmission {
            method,
            action,
            fields,
        })
    }
}

/// Whitespace-normalized text of an element snippet.
pub fn fragment_text(outer_html: &str) -> String {
    let fragment = Html::parse_fragment(outer_html);
    element_text(&fragment.root_element())
}

/// Cell texts per table row (`th` and `td`) found in an element snippet.
pub fn fragment_rows(outer_html: &str) -> Vec<Vec<String>> {
    let fragment = Html::parse_fragment(outer_html);
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return Vec::new();
    };
    fragment
        .select(&row_sel)
        .map(|row| row.select(&cell_sel).map(|cell| element_text(&cell)).collect())
        .collect()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_selector(css: &str) -> Result<Selector, ClientError> {
    Selector::parse(css).map_err(|err| {
        ClientError::new(ClientErrorKind::InvalidSelector, format!("{css}: {err}"))
    })
}

fn find_by_id<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse("[id]").ok()?;
    doc.select(&sel).find(|el| el.value().id() == Some(id))
}

fn collect_controls(scope: ElementRef<'_>) -> Vec<(String, String)> {
    let Ok(sel) = Selector::parse("input, select, textarea") else {
        return Vec::new();
    };
    let option_sel = Selector::parse("option").ok();
    let mut fields = Vec::new();
    for control in scope.select(&sel) {
        let el = control.value();
        let Some(name) = el.attr("name") else {
            continue;
        };
        if el.attr("disabled").is_some() {
            continue;
        }
        let value = match el.name() {
            "input" => {
                let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" | "file" => continue,
                    "checkbox" | "radio" if el.attr("checked").is_none() => continue,
                    "checkbox" | "radio" => el.attr("value").unwrap_or("on").to_string(),
                    _ => el.attr("value").unwrap_or_default().to_string(),
                }
            }
            "select" => {
                let options: Vec<ElementRef<'_>> = option_sel
                    .as_ref()
                    .map(|s| control.select(s).collect())
                    .unwrap_or_default();
                let chosen = options
                    .iter()
                    .find(|o| o.value().attr("selected").is_some())
                    .or_else(|| options.first());
                match chosen {
                    Some(opt) => opt
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| element_text(opt)),
                    None => continue,
                }
            }
            _ => control.text().collect::<String>(),
        };
        fields.push((name.to_string(), value));
    }
    fields
}

fn apply_trigger(trigger: ElementRef<'_>, fields: &mut Vec<(String, String)>) {
    let el = trigger.value();
    if let Some((target, argument)) = el.attr("href").and_then(parse_postback) {
        set_field(fields, "__EVENTTARGET", &target);
        set_field(fields, "__EVENTARGUMENT", &argument);
        return;
    }
    if let Some(name) = el.attr("name") {
        let value = el.attr("value").unwrap_or_default();
        set_field(fields, name, value);
    }
}

fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}

/// `javascript:__doPostBack('ctl00$search','')` -> (`ctl00$search`, ``)
fn parse_postback(href: &str) -> Option<(String, String)> {
    let start = href.find("__doPostBack(")? + "__doPostBack(".len();
    let args = &href[start..href[start..].find(')')? + start];
    let mut parts = args.splitn(2, ',').map(|p| {
        p.trim()
            .trim_matches(&['\'', '"'][..])
            .to_string()
    });
    let target = parts.next()?;
    let argument = parts.next().unwrap_or_default();
    Some((target, argument))
}
