//! Browser-free page parsers. Each takes the raw HTML of a portal page and
//! returns candidate drafts; nothing here touches the store.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use anyhow::anyhow;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sigaa_core::normalize::{
    collapse_whitespace, first_token, map_component_type, map_degree, map_shift, parse_active,
    parse_count, parse_workload, parse_year_period, split_acronym_title,
};
use sigaa_core::{
    parse_requisite_expression, ComponentDraft, CurriculumComponentCode, CurriculumDraft,
    CurriculumFields, CurriculumListingEntry, CurriculumRole, IngestError, IngestResult,
    ProgramDraft,
};
use tracing::warn;

const CONTENT_ROW_CLASSES: [&str; 2] = ["linhaPar", "linhaImpar"];
const UNIT_SELECT: &str = "select[id='form:unidades']";
const CURRICULUM_ROWS: &str = "table#table_lt tr.linha_par, table#table_lt tr.linha_impar";
const ELECTIVES_MARKER: &str = "Optativas";

static PROGRAM_ID: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static CURRICULUM_ROW: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

pub(crate) fn cached_regex(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> anyhow::Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| anyhow!("invalid pattern {pattern:?}: {e}"))
}

pub(crate) fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

pub(crate) fn collapse_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn nearest_ancestor<'a>(element: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == name)
}

fn child_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .map(collapse_text)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRow {
    pub cells: Vec<String>,
    /// `href` of the first link in the row.
    pub link: Option<String>,
}

/// Rows of a grouped listing table in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRow {
    Header(String),
    Content(ContentRow),
}

/// First pass over the program listing: every table holding content rows is
/// flattened into typed rows. A row without any class that has data cells is
/// a group header; content rows carry the `linhaPar`/`linhaImpar` marker.
pub fn parse_listing_rows(html: &str) -> IngestResult<Vec<ListingRow>> {
    let document = Html::parse_document(html);
    let content_sel = selector("tr.linhaPar, tr.linhaImpar")?;
    let tr_sel = selector("tr")?;
    let link_sel = selector("a[href]")?;

    let mut tables = Vec::new();
    let mut seen = HashSet::new();
    for row in document.select(&content_sel) {
        if let Some(table) = nearest_ancestor(row, "table") {
            if seen.insert(table.id()) {
                tables.push(table);
            }
        }
    }

    let mut rows = Vec::new();
    for table in tables {
        let own_rows = table
            .select(&tr_sel)
            .filter(|tr| nearest_ancestor(*tr, "table").map(|t| t.id()) == Some(table.id()));
        for tr in own_rows {
            let classless = tr.value().classes().next().is_none();
            let cells = child_cells(tr);
            if tr.value().classes().any(|c| CONTENT_ROW_CLASSES.contains(&c)) {
                let link = tr
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string);
                rows.push(ListingRow::Content(ContentRow { cells, link }));
            } else if classless && !cells.is_empty() {
                let text = collapse_text(tr);
                if !text.is_empty() {
                    rows.push(ListingRow::Header(text));
                }
            }
        }
    }
    Ok(rows)
}

/// Second pass: pair each content row with the nearest header above it.
pub fn associate_with_headers(rows: &[ListingRow]) -> IngestResult<Vec<(&str, &ContentRow)>> {
    let mut current: Option<&str> = None;
    let mut out = Vec::new();
    for row in rows {
        match row {
            ListingRow::Header(text) => current = Some(text),
            ListingRow::Content(content) => {
                let header = current.ok_or_else(|| {
                    IngestError::not_found(
                        format!(
                            "header row preceding {:?}",
                            content.cells.first().map(String::as_str).unwrap_or_default()
                        ),
                        "program listing",
                    )
                })?;
                out.push((header, content));
            }
        }
    }
    Ok(out)
}

/// `(acronym, title)` of every department header, duplicates removed.
pub fn parse_department_headers(html: &str) -> IngestResult<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = Vec::new();
    for row in parse_listing_rows(html)? {
        if let ListingRow::Header(text) = row {
            let pair = split_acronym_title(&text)?;
            if !out.contains(&pair) {
                out.push(pair);
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOption {
    pub sigaa_id: i64,
    pub label: String,
}

/// Options of the unit select control on the component search page. The
/// placeholder option (value 0 or non-numeric) is dropped.
pub fn parse_unit_options(html: &str, url: &str) -> IngestResult<Vec<UnitOption>> {
    let document = Html::parse_document(html);
    let select_sel = selector(UNIT_SELECT)?;
    let option_sel = selector("option")?;
    let control = document
        .select(&select_sel)
        .next()
        .ok_or_else(|| IngestError::not_found("unit select control", url))?;

    Ok(control
        .select(&option_sel)
        .filter_map(|option| {
            let sigaa_id = option.value().attr("value")?.trim().parse::<i64>().ok()?;
            (sigaa_id > 0).then(|| UnitOption {
                sigaa_id,
                label: collapse_text(option),
            })
        })
        .collect())
}

pub fn parse_program_row(header: &str, row: &ContentRow) -> IngestResult<ProgramDraft> {
    let [title, degree, shift, ..] = row.cells.as_slice() else {
        return Err(IngestError::malformed("program row", row.cells.join(" | ")));
    };
    let id_pattern = cached_regex(&PROGRAM_ID, r"id=([0-9]+)")?;
    let sigaa_id = row
        .link
        .as_deref()
        .and_then(|href| id_pattern.captures(href))
        .and_then(|c| c[1].parse::<i64>().ok());
    let (department_acronym, department_title) = split_acronym_title(header)?;

    Ok(ProgramDraft {
        sigaa_id,
        title: title.clone(),
        degree: map_degree(degree),
        shift: map_shift(shift),
        department_acronym,
        department_title,
    })
}

pub fn parse_program_rows(html: &str) -> IngestResult<Vec<ProgramDraft>> {
    let rows = parse_listing_rows(html)?;
    associate_with_headers(&rows)?
        .into_iter()
        .map(|(header, row)| parse_program_row(header, row))
        .collect()
}

/// Rows of a program's curriculum listing. A row whose first cell does not
/// follow the "Detalhes da Estrutura Curricular <id>, Criado em <year>"
/// shape is malformed; an empty id is left for batch validation to reject.
pub fn parse_curriculum_listing(html: &str) -> IngestResult<Vec<CurriculumListingEntry>> {
    let document = Html::parse_document(html);
    let row_sel = selector(CURRICULUM_ROWS)?;
    let pattern = cached_regex(
        &CURRICULUM_ROW,
        r"Detalhes da Estrutura Curricular (.*), Criado em (.*)",
    )?;

    let mut entries = Vec::new();
    for row in document.select(&row_sel) {
        let cells = child_cells(row);
        let [summary, status, ..] = cells.as_slice() else {
            return Err(IngestError::malformed("curriculum listing row", cells.join(" | ")));
        };
        let captures = pattern
            .captures(summary)
            .ok_or_else(|| IngestError::malformed("curriculum listing row", summary.clone()))?;
        entries.push(CurriculumListingEntry {
            sigaa_id: captures[1].trim().to_string(),
            created_year: captures[2].trim().parse().ok(),
            active: parse_active(status),
        });
    }
    Ok(entries)
}

/// Text of the first `td` following a `th` whose text contains `label`.
pub fn cell_after_label(document: &Html, label: &str) -> IngestResult<Option<String>> {
    let th_sel = selector("th")?;
    Ok(document
        .select(&th_sel)
        .filter(|th| collapse_text(*th).contains(label))
        .find_map(|th| {
            th.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "td")
        })
        .map(collapse_text))
}

fn require_cell(document: &Html, label: &str, url: &str) -> IngestResult<String> {
    cell_after_label(document, label)?
        .ok_or_else(|| IngestError::not_found(format!("cell labelled {label:?}"), url))
}

/// Curriculum structure report. `active` comes from the listing row, the
/// report itself does not repeat it.
pub fn parse_curriculum_report(
    html: &str,
    url: &str,
    program_sigaa_id: i64,
    active: bool,
) -> IngestResult<CurriculumDraft> {
    let document = Html::parse_document(html);
    let cell = |label: &str| require_cell(&document, label, url);
    let workload = |label: &str| cell(label).and_then(|raw| parse_workload(&raw));

    let sigaa_id = cell("Código")?;
    let (start_year, start_period) = parse_year_period(&cell("Período Letivo de Entrada em Vigor")?)?;
    let min_elective_components_workload = workload("Carga Horária Optativa Mínima")?;
    let max_elective_components_workload =
        match cell_after_label(&document, "Carga Horária Optativa Máxima")? {
            Some(raw) => parse_workload(&raw)?,
            None => {
                warn!(
                    curriculum = %sigaa_id,
                    "report has no maximum elective workload; using the minimum"
                );
                min_elective_components_workload
            }
        };

    let fields = CurriculumFields {
        active,
        start_year,
        start_period,
        min_periods: parse_count(&cell("Mínimo:")?)?,
        max_periods: parse_count(&cell("Máximo:")?)?,
        min_period_workload: workload("Carga Horária Mínima por Período Letivo")?,
        max_period_workload: workload("Carga Horária Máxima por Período Letivo")?,
        min_workload: workload("Total Mínima")?,
        mandatory_components_workload: workload("Total:")?,
        min_elective_components_workload,
        max_elective_components_workload,
        min_complementary_components_workload: workload("Carga Horária Complementar Mínima")?,
        max_complementary_components_workload: workload("Carga Horária Máxima de Componentes Eletivos")?,
    };

    Ok(CurriculumDraft {
        sigaa_id,
        program_sigaa_id,
        fields,
    })
}

/// Component codes listed in a curriculum report. Rows inside the table that
/// holds the "Optativas" section are electives, every other component row is
/// mandatory. A code is reported once, at its first row, and is an elective
/// whenever any of its rows sits in the electives table.
pub fn parse_curriculum_component_codes(html: &str) -> IngestResult<Vec<CurriculumComponentCode>> {
    let document = Html::parse_document(html);
    let td_sel = selector("td")?;
    let row_sel = selector("tr.componentes")?;

    let electives_table = document
        .select(&td_sel)
        .find(|td| {
            td.children()
                .filter_map(|node| node.value().as_text())
                .any(|text| text.contains(ELECTIVES_MARKER))
        })
        .and_then(|td| nearest_ancestor(td, "table"));

    let elective_rows: HashSet<_> = electives_table
        .map(|table| table.select(&row_sel).map(|tr| tr.id()).collect())
        .unwrap_or_default();

    let mut position: HashMap<String, usize> = HashMap::new();
    let mut codes: Vec<CurriculumComponentCode> = Vec::new();
    for row in document.select(&row_sel) {
        let Some(first_cell) = child_cells(row).into_iter().next() else {
            continue;
        };
        let Some(code) = first_token(&first_cell) else {
            continue;
        };
        let role = if elective_rows.contains(&row.id()) {
            CurriculumRole::Elective
        } else {
            CurriculumRole::Mandatory
        };
        match position.get(code) {
            Some(&index) => {
                if role == CurriculumRole::Elective {
                    codes[index].role = role;
                }
            }
            None => {
                position.insert(code.to_string(), codes.len());
                codes.push(CurriculumComponentCode {
                    sigaa_id: code.to_string(),
                    role,
                });
            }
        }
    }
    Ok(codes)
}

/// Component detail page. The responsible unit reads "TITLE - CITY"; only the
/// part before the first delimiter names the department.
pub fn parse_component_detail(html: &str, url: &str) -> IngestResult<ComponentDraft> {
    let document = Html::parse_document(html);
    let cell = |label: &str| require_cell(&document, label, url);
    let requisites = |label: &str| -> IngestResult<_> {
        match cell_after_label(&document, label)? {
            Some(raw) => parse_requisite_expression(&raw),
            None => Ok(Vec::new()),
        }
    };

    let unit = cell("Unidade Responsável")?;
    let department_title = unit
        .split_once(" - ")
        .map_or(unit.as_str(), |(title, _)| title)
        .trim()
        .to_string();
    if department_title.is_empty() {
        return Err(IngestError::malformed("responsible unit", unit));
    }

    Ok(ComponentDraft {
        sigaa_id: cell("Código")?,
        title: cell("Nome")?,
        component_type: map_component_type(&cell("Tipo do Componente Curricular")?)?,
        department_title,
        prerequisites: requisites("Pré-Requisitos")?,
        corequisites: requisites("Co-Requisitos")?,
        equivalences: requisites("Equivalências")?,
    })
}

#[cfg(test)]
mod tests {
    use sigaa_core::{ComponentType, Degree, Shift};

    use super::*;

    const PROGRAM_LISTING: &str = r#"
<html><body>
<table class="listagem">
  <thead><tr><th>Nome</th><th>Grau</th><th>Turno</th><th></th></tr></thead>
  <tbody>
    <tr><td colspan="4">FGA - Faculdade do Gama</td></tr>
    <tr class="linhaPar">
      <td>Engenharia de Software</td><td>BACHAREL</td><td>DIURNO</td>
      <td><a href="/sigaa/public/curso/portal.jsf?lc=pt_BR&amp;id=414924">ver</a></td>
    </tr>
    <tr class="linhaImpar">
      <td>Engenharia de Energia</td><td>BACHAREL</td><td>INTEGRAL</td>
      <td><a href="/sigaa/public/curso/portal.jsf?lc=pt_BR&amp;id=414925">ver</a></td>
    </tr>
    <tr><td colspan="4">FUP - Faculdade UnB Planaltina</td></tr>
    <tr class="linhaPar">
      <td>Ciências Naturais</td><td>LICENCIADO</td><td>NOTURNO</td>
      <td><a href="/sigaa/public/curso/portal.jsf?lc=pt_BR&amp;id=500001">ver</a></td>
    </tr>
  </tbody>
</table>
</body></html>"#;

    #[test]
    fn listing_rows_are_tagged_in_order() {
        let rows = parse_listing_rows(PROGRAM_LISTING).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], ListingRow::Header("FGA - Faculdade do Gama".into()));
        assert!(matches!(&rows[1], ListingRow::Content(r) if r.cells[0] == "Engenharia de Software"));
        assert_eq!(rows[3], ListingRow::Header("FUP - Faculdade UnB Planaltina".into()));
    }

    #[test]
    fn content_rows_take_the_nearest_preceding_header() {
        let rows = parse_listing_rows(PROGRAM_LISTING).unwrap();
        let pairs = associate_with_headers(&rows).unwrap();
        let headers: Vec<&str> = pairs.iter().map(|(h, _)| *h).collect();
        assert_eq!(
            headers,
            vec![
                "FGA - Faculdade do Gama",
                "FGA - Faculdade do Gama",
                "FUP - Faculdade UnB Planaltina"
            ]
        );
    }

    #[test]
    fn content_before_any_header_is_an_error() {
        let rows = vec![ListingRow::Content(ContentRow {
            cells: vec!["Orphan".into()],
            link: None,
        })];
        let err = associate_with_headers(&rows).unwrap_err();
        assert!(matches!(err, IngestError::ElementNotFound { .. }));
    }

    #[test]
    fn program_rows_map_vocabulary_and_ids() {
        let programs = parse_program_rows(PROGRAM_LISTING).unwrap();
        assert_eq!(programs.len(), 3);
        let swe = &programs[0];
        assert_eq!(swe.sigaa_id, Some(414924));
        assert_eq!(swe.degree, Degree::Bachelor);
        assert_eq!(swe.shift, Shift::Day);
        assert_eq!(swe.department_acronym, "FGA");
        assert_eq!(swe.department_title, "Faculdade do Gama");
        assert_eq!(programs[1].shift, Shift::Unknown);
        assert_eq!(programs[2].degree, Degree::Licentiate);
        assert_eq!(programs[2].department_acronym, "FUP");
    }

    #[test]
    fn program_link_without_id_leaves_identifier_empty() {
        let row = ContentRow {
            cells: vec!["X".into(), "BACHAREL".into(), "DIURNO".into()],
            link: Some("/sigaa/public/curso/portal.jsf".into()),
        };
        let draft = parse_program_row("FGA - Faculdade do Gama", &row).unwrap();
        assert_eq!(draft.sigaa_id, None);
    }

    #[test]
    fn department_headers_are_split_and_deduplicated() {
        let html = format!("{PROGRAM_LISTING}{PROGRAM_LISTING}");
        let headers = parse_department_headers(&html).unwrap();
        assert_eq!(
            headers,
            vec![
                ("FGA".to_string(), "Faculdade do Gama".to_string()),
                ("FUP".to_string(), "Faculdade UnB Planaltina".to_string()),
            ]
        );
    }

    #[test]
    fn unit_options_skip_placeholder() {
        let html = r#"<form><select id="form:unidades" name="form:unidades">
            <option value="0">-- SELECIONE --</option>
            <option value="673">Faculdade do Gama</option>
            <option value="abc">broken</option>
            <option value=" 1004 ">Faculdade UnB  Planaltina</option>
        </select></form>"#;
        let options = parse_unit_options(html, "search").unwrap();
        assert_eq!(
            options,
            vec![
                UnitOption { sigaa_id: 673, label: "Faculdade do Gama".into() },
                UnitOption { sigaa_id: 1004, label: "Faculdade UnB Planaltina".into() },
            ]
        );
        assert!(parse_unit_options("<html></html>", "search").is_err());
    }

    #[test]
    fn curriculum_listing_reads_id_year_and_status() {
        let html = r#"<table id="table_lt">
            <tr class="linha_par"><td>Detalhes da Estrutura Curricular 6360/1, Criado em 2014</td><td>Inativa</td></tr>
            <tr class="linha_impar"><td>Detalhes da Estrutura Curricular 6360/2, Criado em 2017</td><td>Ativa</td></tr>
        </table>"#;
        let entries = parse_curriculum_listing(html).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sigaa_id, "6360/1");
        assert!(!entries[0].active);
        assert_eq!(entries[1].created_year, Some(2017));
        assert!(entries[1].active);
    }

    #[test]
    fn curriculum_listing_rejects_unexpected_row_text() {
        let html = r#"<table id="table_lt"><tr class="linha_par"><td>???</td><td>Ativa</td></tr></table>"#;
        let err = parse_curriculum_listing(html).unwrap_err();
        assert!(matches!(err, IngestError::MalformedField { field: "curriculum listing row", .. }));
    }

    const REPORT: &str = r#"<table>
        <tr><th>Código:</th><td>6360/2</td></tr>
        <tr><th>Período Letivo de Entrada em Vigor:</th><td>2017.1</td></tr>
        <tr><th>Mínimo:</th><td>8</td></tr>
        <tr><th>Máximo:</th><td>16</td></tr>
        <tr><th>Carga Horária Mínima por Período Letivo:</th><td>180h</td></tr>
        <tr><th>Carga Horária Máxima por Período Letivo:</th><td>480h</td></tr>
        <tr><th>Total Mínima:</th><td>3480h</td></tr>
        <tr><th>Total:</th><td>2700h</td></tr>
        <tr><th>Carga Horária Optativa Mínima:</th><td>600h</td></tr>
        <tr><th>Carga Horária Complementar Mínima:</th><td>180h</td></tr>
        <tr><th>Carga Horária Máxima de Componentes Eletivos:</th><td>360h</td></tr>
    </table>"#;

    #[test]
    fn report_fields_are_read_by_label() {
        let draft = parse_curriculum_report(REPORT, "report", 414924, true).unwrap();
        assert_eq!(draft.sigaa_id, "6360/2");
        assert_eq!(draft.program_sigaa_id, 414924);
        let f = &draft.fields;
        assert_eq!((f.start_year, f.start_period), (2017, 1));
        assert_eq!((f.min_periods, f.max_periods), (8, 16));
        assert_eq!(f.min_workload, 3480);
        assert_eq!(f.mandatory_components_workload, 2700);
        assert_eq!(f.min_elective_components_workload, 600);
        assert_eq!(f.max_elective_components_workload, 600);
        assert_eq!(f.max_complementary_components_workload, 360);
    }

    #[test]
    fn distinct_maximum_elective_workload_is_kept() {
        let html = REPORT.replace(
            "</table>",
            "<tr><th>Carga Horária Optativa Máxima:</th><td>900h</td></tr></table>",
        );
        let draft = parse_curriculum_report(&html, "report", 414924, true).unwrap();
        assert_eq!(draft.fields.min_elective_components_workload, 600);
        assert_eq!(draft.fields.max_elective_components_workload, 900);
    }

    #[test]
    fn report_with_bad_workload_is_malformed() {
        let html = REPORT.replace("3480h", "três mil");
        let err = parse_curriculum_report(&html, "report", 1, true).unwrap_err();
        assert!(matches!(err, IngestError::MalformedField { field: "workload", .. }));
    }

    #[test]
    fn component_codes_are_tagged_by_section_with_electives_winning() {
        let html = r#"
        <table>
          <tr><td>1º Nível</td></tr>
          <tr class="componentes"><td>FGA0158 - ORIENTAÇÃO À OBJETOS - 60h</td></tr>
          <tr class="componentes"><td>FGA0073 - TEORIA DE ELETRÔNICA - 60h</td></tr>
        </table>
        <table>
          <tr><td>Optativas</td></tr>
          <tr class="componentes"><td>FGA0242 - TÉCNICAS DE PROGRAMAÇÃO - 60h</td></tr>
          <tr class="componentes"><td>FGA0242 - TÉCNICAS DE PROGRAMAÇÃO - 60h</td></tr>
          <tr class="componentes"><td>FGA0073 - TEORIA DE ELETRÔNICA - 60h</td></tr>
        </table>"#;
        let codes = parse_curriculum_component_codes(html).unwrap();
        let pairs: Vec<(&str, CurriculumRole)> =
            codes.iter().map(|c| (c.sigaa_id.as_str(), c.role)).collect();
        assert_eq!(
            pairs,
            vec![
                ("FGA0158", CurriculumRole::Mandatory),
                ("FGA0073", CurriculumRole::Elective),
                ("FGA0242", CurriculumRole::Elective),
            ]
        );
    }

    #[test]
    fn component_detail_reads_type_unit_and_requisites() {
        let html = r#"<table>
            <tr><th>Código:</th><td>FGA0242</td></tr>
            <tr><th>Nome:</th><td>TÉCNICAS DE PROGRAMAÇÃO</td></tr>
            <tr><th>Tipo do Componente Curricular:</th><td>DISCIPLINA</td></tr>
            <tr><th>Unidade Responsável:</th><td>Faculdade do Gama - Brasília</td></tr>
            <tr><th>Pré-Requisitos:</th><td>( ( FGA0158 ) OU ( FGA0073 E FGA0074 ) )</td></tr>
            <tr><th>Co-Requisitos:</th><td>-</td></tr>
        </table>"#;
        let draft = parse_component_detail(html, "detail").unwrap();
        assert_eq!(draft.sigaa_id, "FGA0242");
        assert_eq!(draft.component_type, ComponentType::Course);
        assert_eq!(draft.department_title, "Faculdade do Gama");
        assert_eq!(draft.prerequisites.len(), 2);
        assert!(draft.corequisites.is_empty());
        assert!(draft.equivalences.is_empty());
    }

    #[test]
    fn unknown_component_type_is_rejected() {
        let html = r#"<table>
            <tr><th>Código:</th><td>FGA0001</td></tr>
            <tr><th>Nome:</th><td>SEMANA UNIVERSITÁRIA</td></tr>
            <tr><th>Tipo do Componente Curricular:</th><td>PALESTRA</td></tr>
            <tr><th>Unidade Responsável:</th><td>Faculdade do Gama</td></tr>
        </table>"#;
        let err = parse_component_detail(html, "detail").unwrap_err();
        assert!(matches!(err, IngestError::UnknownComponentType(raw) if raw == "PALESTRA"));
    }
}
