use super::{in_thead, Extraction};
use crate::prospect::{FieldWarning, StatLine, StatValue, StatValues};
use crate::{utils, FetchedPage, FieldExtractor};
use lazy_regex::regex_is_match;
use lazy_static::lazy_static;
use scraper::{ElementRef, Selector};
use tracing::debug;

const FIELD: &str = "stats";

/// Spans above this are treated as markup noise.
const MAX_SPAN: usize = 64;

const E: &str = "Invalid selector";
lazy_static! {
    static ref TABLES: [Selector; 3] = [
        Selector::parse(r#"[data-section="stats"] table"#).expect(E),
        Selector::parse("table.stats-table").expect(E),
        Selector::parse("#stats table").expect(E),
    ];
    static ref TR: Selector = Selector::parse("tr").expect(E);
    static ref CAPTION: Selector = Selector::parse("caption").expect(E);
}

/// Stat tables, flattened into one [`StatLine`] per data row in page order.
///
/// Merged cells are expanded so every row is as wide as the table. Cells the
/// table does not provide become [`StatValue::Missing`] and flag the row as
/// partial, the row itself is always kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsParser;

impl FieldExtractor for StatsParser {
    type Value = Vec<StatLine>;

    fn field(&self) -> &'static str {
        FIELD
    }

    fn extract(&self, page: &FetchedPage) -> Extraction<Vec<StatLine>> {
        let Some(tables) = TABLES
            .iter()
            .map(|selector| page.document.select(selector).collect::<Vec<_>>())
            .find(|tables| !tables.is_empty())
        else {
            return Extraction::missing(FIELD);
        };

        let mut lines = vec![];
        let mut warnings = vec![];
        for table in tables {
            parse_table(table, &mut lines, &mut warnings);
        }

        if lines.is_empty() {
            warnings.push(FieldWarning::malformed(FIELD, "stat tables have no data rows"));
            return Extraction::new(None, warnings);
        }
        Extraction::new(Some(lines), warnings)
    }
}

#[derive(Debug, Clone)]
struct Cell {
    /// Same for every grid slot one source cell was expanded into.
    id: usize,
    text: String,
    header: bool,
}

#[derive(Debug)]
struct GridRow {
    cells: Vec<Option<Cell>>,
    in_thead: bool,
    /// Number of `<th>`/`<td>` the row itself declared.
    own_cells: usize,
}

impl GridRow {
    fn is_header(&self) -> bool {
        self.in_thead || self.cells.iter().flatten().all(|c| c.header)
    }

    /// A single source cell stretched across the whole table, e.g. `2024 Season`.
    fn spanning_label(&self, width: usize) -> Option<&str> {
        let first = self.cells.first()?.as_ref()?;
        let spans = width > 1
            && self.cells.len() == width
            && self
                .cells
                .iter()
                .all(|c| matches!(c, Some(c) if c.id == first.id));
        if spans && !first.text.is_empty() {
            Some(first.text.as_str())
        } else {
            None
        }
    }
}

/// Expands `rowspan`/`colspan` so that every cell sits at its visual column.
fn build_grid(table: ElementRef<'_>) -> Vec<GridRow> {
    let mut next_id = 0;
    // column -> (rows still covered, cell)
    let mut carried: Vec<Option<(usize, Cell)>> = vec![];
    let mut grid = vec![];

    for row in table.select(&TR) {
        let sources: Vec<ElementRef<'_>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .collect();

        let mut cells: Vec<Option<Cell>> = vec![];
        let mut sources_iter = sources.iter();
        loop {
            while let Some(slot) = carried.get_mut(cells.len()) {
                let Some((remaining, cell)) = slot.take() else {
                    break;
                };
                cells.push(Some(cell.clone()));
                if remaining > 1 {
                    *slot = Some((remaining - 1, cell));
                }
            }

            let Some(source) = sources_iter.next() else {
                break;
            };
            let cell = Cell {
                id: next_id,
                text: utils::element_text(*source),
                header: source.value().name() == "th",
            };
            next_id += 1;

            let colspan = span(*source, "colspan");
            let rowspan = span(*source, "rowspan");
            for _ in 0..colspan {
                let column = cells.len();
                if rowspan > 1 {
                    if carried.len() <= column {
                        carried.resize(column + 1, None);
                    }
                    carried[column] = Some((rowspan - 1, cell.clone()));
                }
                cells.push(Some(cell.clone()));
            }
        }

        // carried cells right of the last declared one, with gaps kept as holes
        while cells.len() < carried.len() {
            let column = cells.len();
            match carried[column].take() {
                Some((remaining, cell)) => {
                    cells.push(Some(cell.clone()));
                    if remaining > 1 {
                        carried[column] = Some((remaining - 1, cell));
                    }
                }
                None => cells.push(None),
            }
        }

        grid.push(GridRow {
            cells,
            in_thead: in_thead(row),
            own_cells: sources.len(),
        });
    }
    grid
}

fn span(cell: ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

fn parse_table(table: ElementRef<'_>, lines: &mut Vec<StatLine>, warnings: &mut Vec<FieldWarning>) {
    let grid = build_grid(table);
    let width = grid.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    if width == 0 {
        return;
    }

    let category = table
        .select(&CAPTION)
        .next()
        .map(utils::element_text)
        .or_else(|| table.value().attr("data-category").map(utils::normalize_whitespace))
        .filter(|s| !s.is_empty());
    let mut season = table
        .value()
        .attr("data-season")
        .map(utils::normalize_whitespace)
        .filter(|s| !s.is_empty());

    // leading header rows, season banners among them
    let mut header_rows = vec![];
    let mut body_start = 0;
    for row in &grid {
        if let Some(label) = row.spanning_label(width) {
            season = Some(label.to_string());
        } else if row.is_header() && row.own_cells > 0 {
            header_rows.push(row);
        } else {
            break;
        }
        body_start += 1;
    }

    let labels = column_labels(&header_rows, width);
    let season_column = labels
        .iter()
        .position(|l| regex_is_match!(r"(?i)^(year|season|yr)$", l));

    for (index, row) in grid.iter().enumerate().skip(body_start) {
        if row.own_cells == 0 && row.cells.iter().all(Option::is_none) {
            continue;
        }
        if let Some(label) = row.spanning_label(width) {
            season = Some(label.to_string());
            continue;
        }
        if row.is_header() {
            debug!("Skipping repeated header row {} of stat table", index);
            continue;
        }

        let mut values = StatValues::new();
        let mut missing = 0;
        let mut row_season = season.clone();
        for (column, label) in labels.iter().enumerate() {
            let cell = row.cells.get(column).and_then(Option::as_ref);
            if Some(column) == season_column {
                if let Some(cell) = cell.filter(|c| !c.text.is_empty()) {
                    row_season = Some(cell.text.clone());
                }
                continue;
            }
            let value = match cell {
                Some(cell) => StatValue::parse(&cell.text),
                None => StatValue::Missing,
            };
            if value == StatValue::Missing {
                missing += 1;
            }
            values.insert(label.clone(), value);
        }

        if missing > 0 {
            warnings.push(FieldWarning::partial(
                FIELD,
                format!(
                    "row {} ({}) has {} missing cell(s)",
                    lines.len() + 1,
                    row_season.as_deref().unwrap_or("no season"),
                    missing
                ),
            ));
        }
        lines.push(StatLine {
            category: category.clone(),
            season: row_season,
            values,
        });
    }
}

/// One label per column, joining stacked header texts (`Passing YDS`).
fn column_labels(header_rows: &[&GridRow], width: usize) -> Vec<String> {
    let mut labels: Vec<String> = (0..width)
        .map(|column| {
            let mut parts: Vec<&str> = vec![];
            for row in header_rows {
                if let Some(Some(cell)) = row.cells.get(column) {
                    if !cell.text.is_empty() && !parts.contains(&cell.text.as_str()) {
                        parts.push(&cell.text);
                    }
                }
            }
            if parts.is_empty() {
                format!("col{}", column + 1)
            } else {
                parts.join(" ")
            }
        })
        .collect();

    // duplicates would collapse into one map key
    for i in 1..labels.len() {
        let count = labels[..i].iter().filter(|l| **l == labels[i]).count();
        if count > 0 {
            labels[i] = format!("{} ({})", labels[i], count + 1);
        }
    }
    labels
}
