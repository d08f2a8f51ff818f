#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::{TempDir, tempdir};
use txn_view::config::{DataPaths, SourceSettings};

/// Raw-header export with one row per interesting shape: a clean row, a row
/// with currency-formatted amounts and list-literal tags, and a sparse row.
pub const SAMPLE_CSV: &str = "\
Transaction ID,Date,Customer ID,Customer Name,Phone Number,Gender,Age,Product Category,Tags,Quantity,Price per Unit,Discount Percentage,Total Amount,Final Amount,Payment Method,Customer region,Employee name,Loyalty Points
T1,2023-01-15,C1,Asha Rao,9876543210,Female,29,Electronics,sale|gift,2,499.5,10,999,899.1,UPI,North,Kiran,120
T2,2023-02-20T10:30:00,C2,Ravi Kumar,9123456780,Male,41,Clothing,\"['sale', 'new']\",1,\"$1,200.00\",0,\"$1,200.00\",\"$1,200.00\",Card,South,Meera,80
T3,,C3,Meera Iyer,NA,Female,n/a,Beauty,,3,10,,30,30,Cash,,Kiran,
";

/// Scratch directory laid out like a service data directory.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes the delimited source where the default lookup finds it first.
    pub fn write_source(&self, contents: &str) -> PathBuf {
        self.write("data/transactions.csv", contents)
    }

    /// Creates the relational store with a `transactions` table holding
    /// text columns named by `headers`.
    pub fn write_store(&self, headers: &[&str], rows: &[Vec<&str>]) -> PathBuf {
        let path = self.paths().database;
        let conn = Connection::open(&path).expect("open sqlite");
        let columns = headers
            .iter()
            .map(|h| format!("\"{h}\" TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!("CREATE TABLE transactions ({columns})"))
            .expect("create table");
        let placeholders = vec!["?"; headers.len()].join(", ");
        let sql = format!("INSERT INTO transactions VALUES ({placeholders})");
        for row in rows {
            conn.execute(&sql, rusqlite::params_from_iter(row.iter()))
                .expect("insert row");
        }
        path
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::under(self.path())
    }

    pub fn settings(&self) -> SourceSettings {
        SourceSettings::new(self.paths())
    }

    pub fn data_dir_arg(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }
}
