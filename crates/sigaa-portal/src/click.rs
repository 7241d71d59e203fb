//! Turning "click this link" into the request a browser would send.
//!
//! Links on the public portal come in two shapes: plain anchors with an
//! `href`, and JSF command links whose `onclick` calls
//! `jsfcljs(document.getElementById('FORM'), {'k':'v', ...}, '')`, which
//! posts the enclosing form (view state included) with the extra parameters.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};

use crate::parse::{cached_regex, collapse_text, selector};
use crate::{BrowserError, Navigation, PortalPage};

pub const REPORT_LINK_TITLE: &str = "Relatório da Estrutura Curricular";
pub const COMPONENT_LINK_TITLE: &str = "Visualizar Detalhes do Componente Curricular";

static JSFCLJS: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static JSF_PARAM: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// A link identified by its `title` attribute, optionally narrowed to the
/// innermost table row whose text contains `row_text` as a whole token, so
/// `6360/1` never selects the row of `6360/10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickTarget {
    pub row_text: Option<String>,
    pub anchor_title: String,
}

impl ClickTarget {
    pub fn anywhere(anchor_title: impl Into<String>) -> Self {
        Self {
            row_text: None,
            anchor_title: anchor_title.into(),
        }
    }

    pub fn in_row(row_text: impl Into<String>, anchor_title: impl Into<String>) -> Self {
        Self {
            row_text: Some(row_text.into()),
            anchor_title: anchor_title.into(),
        }
    }

    fn describe(&self) -> String {
        match &self.row_text {
            Some(row) => format!("link {:?} in row containing {:?}", self.anchor_title, row),
            None => format!("link {:?}", self.anchor_title),
        }
    }
}

pub fn resolve_click(page: &PortalPage, target: &ClickTarget) -> Result<Navigation, BrowserError> {
    let document = Html::parse_document(&page.html);
    let not_found = || BrowserError::ElementNotFound {
        what: target.describe(),
        url: page.url.clone(),
    };

    let scope = match &target.row_text {
        Some(text) => Some(innermost_row_containing(&document, text)?.ok_or_else(not_found)?),
        None => None,
    };
    let anchor = find_titled_anchor(&document, scope, &target.anchor_title)?.ok_or_else(not_found)?;

    if let Some(onclick) = anchor.value().attr("onclick").filter(|s| s.contains("jsfcljs")) {
        return jsf_postback(&document, page, onclick);
    }

    match anchor.value().attr("href").map(str::trim) {
        Some(href) if !href.is_empty() && href != "#" && !href.starts_with("javascript:") => {
            Ok(Navigation::get(join_url(&page.url, href)?))
        }
        _ => Err(BrowserError::ClickHandler(
            anchor.value().attr("onclick").unwrap_or_default().to_string(),
        )),
    }
}

/// The nearest `tr` around the innermost `td` whose text contains `text`.
fn innermost_row_containing<'a>(
    document: &'a Html,
    text: &str,
) -> Result<Option<ElementRef<'a>>, BrowserError> {
    let td_sel = selector("td")?;
    let cell = document.select(&td_sel).find(|td| {
        contains_token(&collapse_text(*td), text)
            && !td
                .select(&td_sel)
                .any(|inner| inner.id() != td.id() && contains_token(&collapse_text(inner), text))
    });
    Ok(cell.and_then(|td| {
        td.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "tr")
    }))
}

/// `token` occurs in `haystack` with no code character on either side.
fn contains_token(haystack: &str, token: &str) -> bool {
    let is_code_char = |c: char| c.is_alphanumeric() || c == '/';
    haystack.match_indices(token).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + token.len()..].chars().next();
        !before.is_some_and(is_code_char) && !after.is_some_and(is_code_char)
    })
}

fn find_titled_anchor<'a>(
    document: &'a Html,
    scope: Option<ElementRef<'a>>,
    title: &str,
) -> Result<Option<ElementRef<'a>>, BrowserError> {
    let sel = selector("a[title]")?;
    let matches = |a: &ElementRef<'a>| a.value().attr("title").is_some_and(|t| t.contains(title));
    Ok(match scope {
        Some(row) => row.select(&sel).find(matches),
        None => document.select(&sel).find(matches),
    })
}

fn jsf_postback(document: &Html, page: &PortalPage, onclick: &str) -> Result<Navigation, BrowserError> {
    let call = cached_regex(
        &JSFCLJS,
        r"jsfcljs\(\s*document\.getElementById\('([^']+)'\)\s*,\s*\{([^}]*)\}",
    )?;
    let param = cached_regex(&JSF_PARAM, r"'([^']*)'\s*:\s*'([^']*)'")?;

    let captures = call
        .captures(onclick)
        .ok_or_else(|| BrowserError::ClickHandler(onclick.to_string()))?;
    let form_id = &captures[1];
    let trigger: BTreeMap<String, String> = param
        .captures_iter(&captures[2])
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    let form_sel = selector("form[id]")?;
    let form = document
        .select(&form_sel)
        .find(|f| f.value().attr("id") == Some(form_id))
        .ok_or_else(|| BrowserError::ElementNotFound {
            what: format!("form {form_id:?}"),
            url: page.url.clone(),
        })?;

    let mut fields = form_fields(form)?;
    for (name, value) in &trigger {
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.clone(),
            None => fields.push((name.clone(), value.clone())),
        }
    }

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => join_url(&page.url, action)?,
        _ => page.url.clone(),
    };

    Ok(Navigation::SubmitForm {
        action,
        fields,
        trigger,
    })
}

/// Successful controls of a form, in document order.
fn form_fields(form: ElementRef<'_>) -> Result<Vec<(String, String)>, BrowserError> {
    let control_sel = selector("input[name], select[name], textarea[name]")?;
    let option_sel = selector("option")?;
    let mut fields = Vec::new();

    for control in form.select(&control_sel) {
        let element = control.value();
        let Some(name) = element.attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        if element.attr("disabled").is_some() {
            continue;
        }
        match element.name() {
            "input" => {
                let kind = element.attr("type").unwrap_or("text").to_ascii_lowercase();
                if matches!(kind.as_str(), "submit" | "button" | "image" | "reset" | "file") {
                    continue;
                }
                if matches!(kind.as_str(), "radio" | "checkbox") && element.attr("checked").is_none() {
                    continue;
                }
                let default = if kind == "checkbox" { "on" } else { "" };
                let value = element.attr("value").unwrap_or(default);
                fields.push((name.to_string(), value.to_string()));
            }
            "select" => {
                let options: Vec<ElementRef<'_>> = control.select(&option_sel).collect();
                let selected: Vec<&ElementRef<'_>> = options
                    .iter()
                    .filter(|o| o.value().attr("selected").is_some())
                    .collect();
                let chosen = if selected.is_empty() {
                    options.first().into_iter().collect()
                } else {
                    selected
                };
                for option in chosen {
                    let value = option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| collapse_text(*option));
                    fields.push((name.to_string(), value));
                }
            }
            _ => fields.push((name.to_string(), control.text().collect())),
        }
    }
    Ok(fields)
}

fn join_url(base: &str, href: &str) -> Result<String, BrowserError> {
    let invalid = |reason: String| BrowserError::InvalidUrl {
        url: href.to_string(),
        reason,
    };
    let base = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    base.join(href)
        .map(String::from)
        .map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
<html><body>
<form id="formCurriculosCurso" name="formCurriculosCurso" method="post" action="/sigaa/public/curso/curriculo.jsf">
  <input type="hidden" name="formCurriculosCurso" value="formCurriculosCurso" />
  <input type="checkbox" name="mostrarInativos" />
  <select name="nivel"><option value="G" selected="selected">Graduação</option><option value="S">Stricto</option></select>
  <table id="table_lt">
    <tr class="linha_par">
      <td>Detalhes da Estrutura Curricular 6360/1, Criado em 2014</td>
      <td>Inativa</td>
      <td><a href="#" onclick="if(typeof jsfcljs == 'function'){jsfcljs(document.getElementById('formCurriculosCurso'),{'formCurriculosCurso:j_id_jsp_1_30':'formCurriculosCurso:j_id_jsp_1_30','id':'100001'},'');}return false" title="Relatório da Estrutura Curricular">r</a></td>
    </tr>
    <tr class="linha_impar">
      <td>Detalhes da Estrutura Curricular 6360/2, Criado em 2017</td>
      <td>Ativa</td>
      <td><a href="#" onclick="if(typeof jsfcljs == 'function'){jsfcljs(document.getElementById('formCurriculosCurso'),{'formCurriculosCurso:j_id_jsp_1_30':'formCurriculosCurso:j_id_jsp_1_30','id':'100002'},'');}return false" title="Relatório da Estrutura Curricular">r</a></td>
    </tr>
  </table>
  <input type="hidden" name="javax.faces.ViewState" id="javax.faces.ViewState" value="j_id3" />
</form>
</body></html>"##;

    fn listing_page() -> PortalPage {
        PortalPage {
            url: "https://sigaa.unb.br/sigaa/public/curso/curriculo.jsf?id=414924".into(),
            html: LISTING.into(),
        }
    }

    #[test]
    fn jsf_link_in_row_becomes_form_postback() {
        let nav = resolve_click(&listing_page(), &ClickTarget::in_row("6360/2", REPORT_LINK_TITLE)).unwrap();
        let Navigation::SubmitForm { action, fields, trigger } = nav else {
            panic!("expected form submission");
        };

        assert_eq!(action, "https://sigaa.unb.br/sigaa/public/curso/curriculo.jsf");
        assert_eq!(trigger.get("id").map(String::as_str), Some("100002"));
        assert!(fields.contains(&("javax.faces.ViewState".into(), "j_id3".into())));
        assert!(fields.contains(&("nivel".into(), "G".into())));
        assert!(fields.contains(&("id".into(), "100002".into())));
        assert!(!fields.iter().any(|(n, _)| n == "mostrarInativos"));
    }

    #[test]
    fn row_match_ignores_codes_that_only_share_a_prefix() {
        let html = LISTING
            .replace("6360/1,", "6360/10,")
            .replace("6360/2,", "6360/1,");
        let page = PortalPage {
            html,
            ..listing_page()
        };
        let nav = resolve_click(&page, &ClickTarget::in_row("6360/1", REPORT_LINK_TITLE)).unwrap();
        let Navigation::SubmitForm { trigger, .. } = nav else {
            panic!("expected form submission");
        };
        assert_eq!(trigger.get("id").map(String::as_str), Some("100002"));

        assert!(contains_token("Estrutura 6360/1, Criado", "6360/1"));
        assert!(!contains_token("Estrutura 6360/10, Criado", "6360/1"));
        assert!(!contains_token("FGA00731 - X", "FGA0073"));
    }

    #[test]
    fn missing_row_is_element_not_found() {
        let err = resolve_click(&listing_page(), &ClickTarget::in_row("9999/9", REPORT_LINK_TITLE)).unwrap_err();
        assert!(matches!(err, BrowserError::ElementNotFound { .. }));
    }

    #[test]
    fn plain_href_resolves_against_page_url() {
        let page = PortalPage {
            url: "https://sigaa.unb.br/sigaa/public/curso/lista.jsf".into(),
            html: r#"<a href="portal.jsf?id=414924" title="Visualizar Página do Curso">x</a>"#.into(),
        };
        let nav = resolve_click(&page, &ClickTarget::anywhere("Página do Curso")).unwrap();
        assert_eq!(
            nav,
            Navigation::get("https://sigaa.unb.br/sigaa/public/curso/portal.jsf?id=414924")
        );
    }
}
