use std::{collections::HashMap, sync::RwLock};

use log::info;
use once_cell::sync::Lazy;

use crate::{
    catalog::Table,
    error::{DbError, DbResult},
    predicate::Op,
    stats::{get_histogram_bins, get_io_cost_per_page, IntHistogram, StringHistogram},
    storage::{cell::Cell, schema::Type, Schema},
    transaction::Transaction,
    utils::HandyRwLock,
    Database,
};

static STATS_MAP: Lazy<RwLock<HashMap<String, TableStats>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn get_table_stats(table_name: &str) -> Option<TableStats> {
    STATS_MAP.rl().get(table_name).cloned()
}

pub fn set_table_stats(table_name: &str, stats: TableStats) {
    STATS_MAP.wl().insert(table_name.to_string(), stats);
}

pub(crate) fn clear_stats() {
    STATS_MAP.wl().clear();
}

/// Scan every heap table in the catalog and publish its statistics.
pub fn compute_statistics() -> DbResult<()> {
    let tables: Vec<(u32, String)> = {
        let catalog = Database::catalog();
        catalog
            .table_ids()
            .into_iter()
            .filter_map(|id| catalog.get_table_name(id).ok().map(|name| (id, name)))
            .collect()
    };

    for (table_id, name) in tables {
        match TableStats::new(table_id, get_io_cost_per_page()) {
            Ok(stats) => {
                set_table_stats(&name, stats);
            }
            Err(DbError::NoSuchTable(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    info!("table statistics computed");
    Ok(())
}

/// Per-table selectivity statistics: one scan captures row and page
/// counts, per-column min/max for ints, and the full value list each
/// column produced. Histograms are built on demand per estimate.
#[derive(Clone)]
pub struct TableStats {
    io_cost_per_page: usize,
    ntups: usize,
    npages: usize,

    scheme: Schema,
    min_vals: Vec<i32>,
    max_vals: Vec<i32>,
    columns: Vec<Vec<Cell>>,
}

impl TableStats {
    pub fn new(table_id: u32, io_cost_per_page: usize) -> DbResult<Self> {
        let table = {
            let catalog = Database::catalog();
            catalog.get_table(table_id)?
        };
        let heap = match table {
            Table::Heap(t) => t,
            // index files carry no base-table statistics
            Table::BTree(_) => {
                return Err(DbError::NoSuchTable(format!(
                    "table {} is not a heap table",
                    table_id
                )))
            }
        };

        let heap = heap.rl();
        let scheme = heap.get_scheme();
        let field_count = scheme.fields_count();

        let mut min_vals = vec![i32::MAX; field_count];
        let mut max_vals = vec![i32::MIN; field_count];
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); field_count];
        let mut ntups = 0;

        let tx = Transaction::new();
        let mut it = heap.iter(&tx);
        it.open();
        for tuple in it.by_ref() {
            ntups += 1;
            for i in 0..field_count {
                let cell = tuple.get_cell(i);
                if let Cell::Int(v) = cell {
                    min_vals[i] = min_vals[i].min(v);
                    max_vals[i] = max_vals[i].max(v);
                }
                columns[i].push(cell);
            }
        }
        it.close();
        let npages = heap.pages_count();
        drop(heap);
        tx.commit()?;

        Ok(Self {
            io_cost_per_page,
            ntups,
            npages,
            scheme,
            min_vals,
            max_vals,
            columns,
        })
    }

    /// Cost of a full sequential scan; partial pages read as whole ones.
    pub fn estimate_scan_cost(&self) -> f64 {
        (self.npages * self.io_cost_per_page) as f64
    }

    /// Rows surviving a predicate of the given selectivity.
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.ntups as f64 * selectivity) as usize
    }

    pub fn total_tuples(&self) -> usize {
        self.ntups
    }

    /// Selectivity of `field <op> constant`, estimated from a fresh
    /// histogram over the column's captured values.
    pub fn estimate_selectivity(&self, i: usize, op: &Op, constant: &Cell) -> DbResult<f64> {
        let field_type = self.scheme.get_type(i)?;
        if self.columns[i].is_empty() {
            return Ok(0.0);
        }
        let bins = get_histogram_bins();

        match field_type {
            Type::Int => {
                let mut hist = IntHistogram::new(bins, self.min_vals[i], self.max_vals[i]);
                for cell in &self.columns[i] {
                    hist.add_value(cell.get_int()?);
                }
                Ok(hist.estimate_selectivity(op, constant.get_int()?))
            }
            Type::Char(_) => {
                let mut hist = StringHistogram::new(bins);
                for cell in &self.columns[i] {
                    hist.add_value(&cell.get_string()?);
                }
                Ok(hist.estimate_selectivity(op, &constant.get_string()?))
            }
        }
    }
}
