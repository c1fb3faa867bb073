///! Server status HTML parser
///!
///! Turns the rendered server-status page into [`ServerSnapshot`]s.
///! The page has no stable schema, so every header and every row is parsed
///! on its own: a bad unit is reported as a skip and the rest carries on.

use scraper::{ElementRef, Html, Selector};
use sietch_common::{ServerSnapshot, SietchReading};
use tracing::{debug, info, warn};

use crate::error::ExtractError;

const HEADER_SELECTOR: &str = "div.border-slate-700.flex.justify-between";
const NAME_SELECTOR: &str = "div.text-2xl";
const REGION_SELECTOR: &str = "div.text-xl";
const ROW_SELECTOR: &str = "tbody tr";
const CELL_SELECTOR: &str = "td";
const TABLE_TAG: &str = "table";
const TABLE_CLASS: &str = "datatable";
const SUMMARY_ROW: &str = "total";

/// Why a table row produced no reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    MissingCells { found: usize },
    BadPopulation { sietch: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Reading(SietchReading),
    /// The "Total" line at the bottom of every table
    Summary,
    Skipped(RowSkip),
}

/// Why a server header produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSkip {
    MissingName,
    MissingRegion { server: String },
    MissingTable { server: String },
    NoReadings { server: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    Snapshot {
        snapshot: ServerSnapshot,
        skipped_rows: Vec<RowSkip>,
    },
    Skipped(SectionSkip),
}

/// Everything one pass over the page found, including what it had to drop.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub headers_found: usize,
    pub snapshots: Vec<ServerSnapshot>,
    pub skipped_sections: Vec<SectionSkip>,
    pub skipped_rows: usize,
}

impl ExtractionReport {
    /// Fail when nothing usable came out of the page.
    pub fn into_snapshots(self) -> Result<Vec<ServerSnapshot>, ExtractError> {
        if !self.snapshots.is_empty() {
            return Ok(self.snapshots);
        }
        if self.headers_found == 0 {
            Err(ExtractError::NoServerHeaders)
        } else {
            Err(ExtractError::NoValidSections {
                headers: self.headers_found,
            })
        }
    }
}

struct Selectors {
    header: Selector,
    name: Selector,
    region: Selector,
    row: Selector,
    cell: Selector,
}

impl Selectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            header: parse_selector(HEADER_SELECTOR)?,
            name: parse_selector(NAME_SELECTOR)?,
            region: parse_selector(REGION_SELECTOR)?,
            row: parse_selector(ROW_SELECTOR)?,
            cell: parse_selector(CELL_SELECTOR)?,
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector(format!("{}: {:?}", css, e)))
}

/// Normalise whitespace in an element's text content.
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a population cell like "42/100" (spaces around either number allowed).
fn parse_population(text: &str) -> Option<(u32, u32)> {
    let (current, max) = text.split_once('/')?;
    let current = current.trim().parse::<u32>().ok()?;
    let max = max.trim().parse::<u32>().ok()?;
    Some((current, max))
}

fn parse_row(row: ElementRef<'_>, cell_sel: &Selector) -> RowOutcome {
    let cells: Vec<String> = row.select(cell_sel).map(element_text).collect();

    let [name, population, ..] = cells.as_slice() else {
        return RowOutcome::Skipped(RowSkip::MissingCells { found: cells.len() });
    };

    if name.eq_ignore_ascii_case(SUMMARY_ROW) {
        return RowOutcome::Summary;
    }

    match parse_population(population) {
        Some((player_count, max_players)) => {
            RowOutcome::Reading(SietchReading::new(name.clone(), player_count, max_players))
        }
        None => RowOutcome::Skipped(RowSkip::BadPopulation {
            sietch: name.clone(),
            text: population.clone(),
        }),
    }
}

/// Find the data table that belongs to `header`: the first following sibling
/// `table.datatable`, looking no further than the next server header.
fn find_table<'a>(header: ElementRef<'a>, header_sel: &Selector) -> Option<ElementRef<'a>> {
    header
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|sibling| !header_sel.matches(sibling))
        .find(|sibling| {
            sibling.value().name() == TABLE_TAG
                && sibling.value().classes().any(|class| class == TABLE_CLASS)
        })
}

fn parse_section(header: ElementRef<'_>, sel: &Selectors) -> SectionOutcome {
    let Some(name) = header.select(&sel.name).next().map(element_text) else {
        return SectionOutcome::Skipped(SectionSkip::MissingName);
    };
    let Some(region) = header.select(&sel.region).next().map(element_text) else {
        return SectionOutcome::Skipped(SectionSkip::MissingRegion { server: name });
    };
    let Some(table) = find_table(header, &sel.header) else {
        return SectionOutcome::Skipped(SectionSkip::MissingTable { server: name });
    };

    let mut sietches = Vec::new();
    let mut skipped_rows = Vec::new();

    for row in table.select(&sel.row) {
        match parse_row(row, &sel.cell) {
            RowOutcome::Reading(reading) => {
                if reading.is_over_capacity() {
                    debug!("  {} reports more players than capacity: {}", name, reading);
                }
                debug!("  Found sietch: {}", reading);
                sietches.push(reading);
            }
            RowOutcome::Summary => {}
            RowOutcome::Skipped(skip) => {
                debug!("  Skipping row in {}: {:?}", name, skip);
                skipped_rows.push(skip);
            }
        }
    }

    if sietches.is_empty() {
        return SectionOutcome::Skipped(SectionSkip::NoReadings { server: name });
    }

    SectionOutcome::Snapshot {
        snapshot: ServerSnapshot { name, region, sietches },
        skipped_rows,
    }
}

/// Parse the rendered status page, keeping track of everything skipped.
pub fn parse_status_html(html: &str) -> Result<ExtractionReport, ExtractError> {
    let document = Html::parse_document(html);
    let sel = Selectors::new()?;

    let mut report = ExtractionReport::default();

    for header in document.select(&sel.header) {
        report.headers_found += 1;

        match parse_section(header, &sel) {
            SectionOutcome::Snapshot { snapshot, skipped_rows } => {
                debug!("Processed server: {}", snapshot);
                report.skipped_rows += skipped_rows.len();
                report.snapshots.push(snapshot);
            }
            SectionOutcome::Skipped(skip) => {
                warn!("Skipping server section: {:?}", skip);
                report.skipped_sections.push(skip);
            }
        }
    }

    info!(
        "Found {} server headers: {} snapshots, {} sections skipped, {} rows skipped",
        report.headers_found,
        report.snapshots.len(),
        report.skipped_sections.len(),
        report.skipped_rows
    );

    Ok(report)
}

/// Extract server snapshots in document order; fails if none could be built.
pub fn extract(html: &str) -> Result<Vec<ServerSnapshot>, ExtractError> {
    parse_status_html(html)?.into_snapshots()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: Option<&str>, region: Option<&str>) -> String {
        let name = name
            .map(|n| format!(r#"<div class="text-2xl font-bold">{}</div>"#, n))
            .unwrap_or_default();
        let region = region
            .map(|r| format!(r#"<div class="text-xl text-slate-400">{}</div>"#, r))
            .unwrap_or_default();
        format!(
            r#"<div class="mt-4 flex justify-between border-b border-slate-700"><div>{}{}</div><div class="text-sm">live</div></div>"#,
            name, region
        )
    }

    fn table(rows: &[(&str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(name, pop)| format!("<tr><td>{}</td><td>{}</td></tr>", name, pop))
            .collect();
        format!(
            r#"<table class="datatable w-full"><thead><tr><th>Sietch</th><th>Players</th></tr></thead><tbody>{}</tbody></table>"#,
            body
        )
    }

    fn page(sections: &[String]) -> String {
        format!(
            "<html><body><main><div class=\"container\">{}</div></main></body></html>",
            sections.concat()
        )
    }

    #[test]
    fn test_parse_population() {
        assert_eq!(parse_population("42/100"), Some((42, 100)));
        assert_eq!(parse_population(" 0 / 50 "), Some((0, 50)));
        assert_eq!(parse_population("42"), None);
        assert_eq!(parse_population("a/b"), None);
        assert_eq!(parse_population("1/2/3"), None);
        assert_eq!(parse_population("-1/5"), None);
        assert_eq!(parse_population(""), None);
        assert_eq!(parse_population("/100"), None);
    }

    #[test]
    fn test_arrakis_example() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[("Hagga Basin", "42/100"), ("Sietch Tabr", "0/50"), ("Total", "42/150")]),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(
            snapshots,
            vec![ServerSnapshot {
                name: "Arrakis-1".to_string(),
                region: "US-East".to_string(),
                sietches: vec![
                    SietchReading::new("Hagga Basin", 42, 100),
                    SietchReading::new("Sietch Tabr", 0, 50),
                ],
            }]
        );
    }

    #[test]
    fn test_document_order() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[("Hagga Basin", "1/10")]),
            header(Some("Arrakis-2"), Some("EU-West")),
            table(&[("Hagga Basin", "2/10")]),
            header(Some("Arrakis-3"), Some("Asia")),
            table(&[("Hagga Basin", "3/10")]),
        ]);
        let names: Vec<String> = extract(&html).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Arrakis-1", "Arrakis-2", "Arrakis-3"]);
    }

    #[test]
    fn test_total_row_any_case() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[("TOTAL", "9/9"), ("Hagga Basin", "4/10"), ("total", "4/10"), ("ToTaL", "1/1")]),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(snapshots[0].sietches, vec![SietchReading::new("Hagga Basin", 4, 10)]);
    }

    #[test]
    fn test_bad_rows_are_isolated() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[
                ("Hagga Basin", "42/100"),
                ("Broken", "n/a"),
                ("Half", "17"),
                ("Sietch Tabr", "0/50"),
            ]),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(report.skipped_rows, 2);
        let sietches = &report.snapshots[0].sietches;
        assert_eq!(sietches.len(), 2);
        assert_eq!(sietches[0].name, "Hagga Basin");
        assert_eq!(sietches[1].name, "Sietch Tabr");
    }

    #[test]
    fn test_row_with_one_cell_skipped() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            r#"<table class="datatable"><tbody><tr><td colspan="2">Maintenance</td></tr><tr><td>Hagga Basin</td><td>5/10</td></tr></tbody></table>"#.to_string(),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.snapshots[0].sietches, vec![SietchReading::new("Hagga Basin", 5, 10)]);
    }

    #[test]
    fn test_parse_row_outcomes() {
        let html = r#"<table><tbody>
            <tr><td>Hagga Basin</td><td>42/100</td><td>extra</td></tr>
            <tr><td>Total</td><td>42/100</td></tr>
            <tr><td>Lonely</td></tr>
            <tr><td>Broken</td><td>??</td></tr>
        </tbody></table>"#;
        let document = Html::parse_document(html);
        let row_sel = Selector::parse("tbody tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();
        let outcomes: Vec<RowOutcome> = document
            .select(&row_sel)
            .map(|row| parse_row(row, &cell_sel))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                RowOutcome::Reading(SietchReading::new("Hagga Basin", 42, 100)),
                RowOutcome::Summary,
                RowOutcome::Skipped(RowSkip::MissingCells { found: 1 }),
                RowOutcome::Skipped(RowSkip::BadPopulation {
                    sietch: "Broken".to_string(),
                    text: "??".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn test_section_without_valid_rows_dropped() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[("Total", "0/0"), ("Broken", "x/y")]),
            header(Some("Arrakis-2"), Some("EU-West")),
            table(&[("Hagga Basin", "3/10")]),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(report.headers_found, 2);
        assert_eq!(report.snapshots.len(), 1);
        assert_eq!(report.snapshots[0].name, "Arrakis-2");
        assert_eq!(
            report.skipped_sections,
            vec![SectionSkip::NoReadings { server: "Arrakis-1".to_string() }]
        );
    }

    #[test]
    fn test_header_missing_region_dropped() {
        let html = page(&[
            header(Some("Arrakis-1"), None),
            table(&[("Hagga Basin", "1/10")]),
            header(Some("Arrakis-2"), Some("EU-West")),
            table(&[("Hagga Basin", "2/10")]),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(
            report.skipped_sections,
            vec![SectionSkip::MissingRegion { server: "Arrakis-1".to_string() }]
        );
        let snapshots = report.into_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "Arrakis-2");
    }

    #[test]
    fn test_header_missing_name_dropped() {
        let html = page(&[
            header(None, Some("US-East")),
            table(&[("Hagga Basin", "1/10")]),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(report.skipped_sections, vec![SectionSkip::MissingName]);
        assert_eq!(report.into_snapshots(), Err(ExtractError::NoValidSections { headers: 1 }));
    }

    #[test]
    fn test_missing_table_does_not_borrow_next_table() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            header(Some("Arrakis-2"), Some("EU-West")),
            table(&[("Hagga Basin", "2/10")]),
        ]);
        let report = parse_status_html(&html).unwrap();
        assert_eq!(
            report.skipped_sections,
            vec![SectionSkip::MissingTable { server: "Arrakis-1".to_string() }]
        );
        assert_eq!(report.snapshots.len(), 1);
        assert_eq!(report.snapshots[0].name, "Arrakis-2");
    }

    #[test]
    fn test_table_found_past_unrelated_siblings() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            r#"<p>Last updated 2 minutes ago</p><table class="legend"><tbody><tr><td>x</td><td>1/1</td></tr></tbody></table>"#.to_string(),
            table(&[("Hagga Basin", "7/10")]),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(snapshots[0].sietches, vec![SietchReading::new("Hagga Basin", 7, 10)]);
    }

    #[test]
    fn test_table_without_tbody() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            r#"<table class="datatable"><tr><td>Hagga Basin</td><td>8/10</td></tr></table>"#.to_string(),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(snapshots[0].sietches, vec![SietchReading::new("Hagga Basin", 8, 10)]);
    }

    #[test]
    fn test_whitespace_is_normalised() {
        let html = page(&[
            header(Some("\n   Arrakis-1  \n"), Some("  US-East ")),
            table(&[("  Hagga\n   Basin ", " 42 / 100 ")]),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(snapshots[0].name, "Arrakis-1");
        assert_eq!(snapshots[0].region, "US-East");
        assert_eq!(snapshots[0].sietches[0], SietchReading::new("Hagga Basin", 42, 100));
    }

    #[test]
    fn test_duplicates_and_over_capacity_pass_through() {
        let html = page(&[
            header(Some("Arrakis-1"), Some("US-East")),
            table(&[("Hagga Basin", "120/100"), ("Hagga Basin", "3/100")]),
        ]);
        let snapshots = extract(&html).unwrap();
        assert_eq!(
            snapshots[0].sietches,
            vec![
                SietchReading::new("Hagga Basin", 120, 100),
                SietchReading::new("Hagga Basin", 3, 100),
            ]
        );
    }

    #[test]
    fn test_unrecognized_page() {
        let html = "<html><body><h1>We are redesigning!</h1></body></html>";
        assert_eq!(extract(html), Err(ExtractError::NoServerHeaders));
        assert_eq!(extract(""), Err(ExtractError::NoServerHeaders));
    }
}
