use calamine::DataType;

use crate::batch::{io_common::split_tags, io_common::simplify_file_name, *};

const COLUMNS: [&str; 8] = [
    "user",
    "locale",
    "xpath",
    "choice",
    "value",
    "reference",
    "delete",
    "unvote",
];

/// Reads submissions from a spreadsheet with a header row naming the columns.
pub fn read_xlsx_submissions(path: &str, source: &SubmissionSource) -> BatchResult<Vec<SubmissionConfig>> {
    let wrange = get_range(path, source)?;

    let header = wrange.rows().next().context(EmptyExcelSnafu {})?;
    debug!("read_xlsx_submissions: header: {:?}", header);
    let col_indexes = get_col_index(header)?;

    let mut res: Vec<SubmissionConfig> = Vec::new();
    // The first row is the header.
    for (idx, row) in wrange.rows().enumerate().skip(1) {
        let cell = |name: &str| -> BatchResult<String> {
            match col_indexes.get(name) {
                Some(col) => read_cell(row.get(*col), idx),
                None => Ok(String::new()),
            }
        };
        let user_s = cell("user")?;
        if user_s.is_empty() {
            debug!("read_xlsx_submissions: skipping empty row {}", idx);
            continue;
        }
        let user = match user_s.parse::<u32>() {
            Ok(u) => u,
            Err(_) => {
                return ExcelWrongCellTypeSnafu {
                    lineno: idx as u64,
                    content: user_s,
                }
                .fail()
            }
        };
        let value = cell("value")?;
        let reference = cell("reference")?;
        res.push(SubmissionConfig {
            user,
            session: None,
            locale: cell("locale")?,
            xpath: cell("xpath")?,
            choice: Some(cell("choice")?),
            value: Some(value),
            reference: if reference.is_empty() {
                None
            } else {
                Some(reference)
            },
            delete: Some(split_tags(&cell("delete")?)),
            unvote: Some(split_tags(&cell("unvote")?)),
        });
    }
    info!(
        "read_xlsx_submissions: {} submissions read from {}",
        res.len(),
        simplify_file_name(path)
    );
    Ok(res)
}

fn read_cell(cell: Option<&DataType>, lineno: usize) -> BatchResult<String> {
    match cell {
        None | Some(DataType::Empty) => Ok(String::new()),
        Some(DataType::String(s)) => Ok(s.clone()),
        Some(DataType::Int(i)) => Ok(i.to_string()),
        Some(DataType::Float(f)) if f.fract() == 0.0 => Ok((*f as i64).to_string()),
        Some(x) => ExcelWrongCellTypeSnafu {
            lineno: lineno as u64,
            content: format!("{:?}", x),
        }
        .fail(),
    }
}

fn get_col_index(header: &[DataType]) -> BatchResult<HashMap<String, usize>> {
    let mut res: HashMap<String, usize> = HashMap::new();
    for (idx, cell) in header.iter().enumerate() {
        if let DataType::String(s) = cell {
            let name = s.trim().to_lowercase();
            if COLUMNS.contains(&name.as_str()) {
                res.insert(name, idx);
            }
        }
    }
    for required in ["user", "locale", "xpath"] {
        if !res.contains_key(required) {
            whatever!("Missing column {} in the header {:?}", required, header);
        }
    }
    Ok(res)
}

fn get_range(path: &str, source: &SubmissionSource) -> BatchResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, &source.excel_worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    match &source.excel_worksheet_name {
        // A worksheet name was provided, use it.
        Some(worksheet_name) => workbook
            .worksheet_range(worksheet_name)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu { path }),
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu {})?
            .context(OpeningExcelSnafu { path }),
    }
}
