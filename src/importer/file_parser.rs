// ==========================================
// 商品导入对账引擎 - 源文件读取
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 按列位置索引的原始行（不解析表头，跳过表头行由导入任务负责）
// ==========================================

use crate::config::config_keys;
use crate::domain::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::debug;

// ==========================================
// SourceReader Trait
// ==========================================
pub trait SourceReader {
    /// 读取全部行
    ///
    /// # 说明
    /// - 空单元格以空字符串出现（CSV）或不出现（Excel 空单元）
    /// - 完全空白的行被跳过
    fn read_rows(&self, path: &Path) -> ImportResult<Vec<RawRow>>;
}

fn check_file(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn is_blank(row: &RawRow) -> bool {
    row.values().all(|v| v.trim().is_empty())
}

// ==========================================
// CSV Reader
// ==========================================
pub struct CsvReader {
    delimiter: u8,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvReader {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

/// 解析 CSV 分隔符配置（支持 "\t" 转义写法）
pub fn parse_delimiter(raw: &str) -> ImportResult<u8> {
    let unescaped = if raw == "\\t" { "\t" } else { raw };
    match unescaped.as_bytes() {
        [b] if b.is_ascii() && !matches!(*b, b'"' | b'\n' | b'\r') => Ok(*b),
        _ => Err(ImportError::ConfigValueError {
            key: config_keys::CSV_DELIMITER.to_string(),
            value: raw.to_string(),
            message: "CSV 分隔符必须为单个 ASCII 字符".to_string(),
        }),
    }
}

impl SourceReader for CsvReader {
    fn read_rows(&self, path: &Path) -> ImportResult<Vec<RawRow>> {
        check_file(path)?;

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(self.delimiter)
            .from_reader(file);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row: RawRow = record
                .iter()
                .enumerate()
                .map(|(pos, value)| (pos, value.to_string()))
                .collect();

            if is_blank(&row) {
                continue;
            }
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), "CSV 读取完成");
        Ok(rows)
    }
}

// ==========================================
// Excel Reader（读取第一个工作表）
// ==========================================
pub struct ExcelReader;

impl SourceReader for ExcelReader {
    fn read_rows(&self, path: &Path) -> ImportResult<Vec<RawRow>> {
        check_file(path)?;

        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))??;

        let mut rows = Vec::new();
        for data_row in range.rows() {
            let row: RawRow = data_row
                .iter()
                .enumerate()
                .filter(|(_, cell)| !matches!(cell, Data::Empty))
                .map(|(pos, cell)| (pos, cell.to_string()))
                .collect();

            if is_blank(&row) {
                continue;
            }
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), "Excel 读取完成");
        Ok(rows)
    }
}

// ==========================================
// 通用读取（根据扩展名自动选择）
// ==========================================
#[derive(Default)]
pub struct UniversalReader {
    csv: CsvReader,
}

impl UniversalReader {
    pub fn with_csv_delimiter(delimiter: u8) -> Self {
        Self {
            csv: CsvReader::with_delimiter(delimiter),
        }
    }
}

impl SourceReader for UniversalReader {
    fn read_rows(&self, path: &Path) -> ImportResult<Vec<RawRow>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => self.csv.read_rows(path),
            "xlsx" | "xls" => ExcelReader.read_rows(path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_csv_rows_by_position() {
        let file = csv_file(&["code,name", "P1,Shoe", "P2"]);

        let rows = UniversalReader::default().read_rows(file.path()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get(&0).map(String::as_str), Some("P1"));
        assert_eq!(rows[1].get(&1).map(String::as_str), Some("Shoe"));
        assert!(!rows[2].contains_key(&1), "缺失列不应出现");
    }

    #[test]
    fn test_csv_multiline_cell_preserved() {
        let file = csv_file(&["P1,\"a.jpg\nb.jpg\""]);

        let rows = CsvReader::default().read_rows(file.path()).unwrap();
        assert_eq!(rows[0].get(&1).map(String::as_str), Some("a.jpg\nb.jpg"));
    }

    #[test]
    fn test_csv_skip_blank_rows() {
        let file = csv_file(&["P1,1", ",", "P2,2"]);

        let rows = CsvReader::default().read_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_file_not_found_and_unsupported() {
        let err = UniversalReader::default()
            .read_rows(Path::new("non_existent.csv"))
            .unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));

        let err = UniversalReader::default().read_rows(Path::new("data.xml")).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_csv_custom_delimiter() {
        let file = csv_file(&["P1;Shoe;10,50"]);

        let rows = UniversalReader::with_csv_delimiter(parse_delimiter(";").unwrap())
            .read_rows(file.path())
            .unwrap();
        assert_eq!(rows[0].get(&2).map(String::as_str), Some("10,50"));

        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("§").is_err());
    }
}
