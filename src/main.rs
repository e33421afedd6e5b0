use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagestore::buffer::PageManager;
use pagestore::common::{
    StorageConfig, TransactionId, DEFAULT_EVICT_BATCH_SIZE, DEFAULT_IN_MEMORY_PAGE_LIMIT, DEFAULT_PAGE_SIZE,
};
use pagestore::heap::{PageListCollection, StringHeapCollection};
use pagestore::index::{BTreeCollection, ColumnComparer};
use pagestore::transaction::{LockingTransaction, PageLockManager, Transaction};
use pagestore::tuple::{ColumnInfo, ColumnSchema, RowHolder, Value};
use pagestore::Result;

/// Loads a B-tree, a page list and a string heap into a page store and
/// reports what the buffer pool did.
#[derive(Parser, Debug)]
#[command(name = "pagestore", version, about = "Embedded page store demo")]
struct Args {
    /// Store file; runs in memory when omitted
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Page size in bytes
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Pages kept in memory before eviction starts
    #[arg(long, default_value_t = DEFAULT_IN_MEMORY_PAGE_LIMIT)]
    page_limit: usize,

    /// Pages evicted at once when the limit is reached
    #[arg(long, default_value_t = DEFAULT_EVICT_BATCH_SIZE)]
    evict_batch: usize,

    /// Number of keys to insert
    #[arg(short = 'n', long, default_value_t = 10_000)]
    keys: i32,

    /// Log filter, e.g. "pagestore=debug"
    #[arg(long, default_value = "pagestore=info")]
    log: String,
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = StorageConfig::default()
        .with_page_size(args.page_size)
        .with_eviction(args.page_limit, args.evict_batch);
    let manager = Arc::new(match &args.file {
        Some(path) => PageManager::open_file(path, config.clone())?,
        None => PageManager::in_memory(config.clone())?,
    });
    info!(page_size = config.page_size, file = ?args.file, "opened page store");

    let locks = Arc::new(PageLockManager::from_config(&config));
    let tran = LockingTransaction::new(TransactionId::new(1), locks);

    let schema = Arc::new(ColumnSchema::new(vec![ColumnInfo::int(), ColumnInfo::double()]));
    let mut tree = BTreeCollection::create(
        manager.clone(),
        Arc::clone(&schema),
        &tran,
        Arc::new(ColumnComparer::new(0)),
        0,
    )?;
    let list = PageListCollection::create(manager.clone(), Arc::clone(&schema), &tran)?;

    // a fixed stride visits every key once in scrambled order when it is
    // coprime with the key count
    let keys = args.keys.max(0);
    let stride = (1..).map(|s: i32| s * 7919 + 1).find(|s| gcd(*s, keys.max(1)) == 1).unwrap_or(1);
    for i in 0..keys {
        let key = ((i as i64 * stride as i64) % keys as i64) as i32;
        let row = RowHolder::from_values(Arc::clone(&schema), &[Value::Int(key), Value::Double(key as f64 / 10.0)])?;
        tree.add(&row, &tran)?;
        list.add(&row, &tran)?;
    }

    println!("b-tree root:        {}", tree.root_page_id());
    println!("b-tree rows:        {}", tree.count(&tran)?);
    println!("page list rows:     {}", list.count(&tran)?);
    if keys > 0 {
        let probe = keys / 2;
        let found = tree.seek(&Value::Int(probe), &tran)?;
        println!("seek({}):          {:?}", probe, found.get_double(1));
        let max = list.max(|row| row.get_double(1), f64::MIN, &tran)?;
        println!("page list max:      {}", max);
    }

    let heap = StringHeapCollection::create(manager.clone(), &tran)?;
    let pointer = heap.add(b"hello from the string heap", &tran)?;
    let value = heap.fetch(pointer, &tran)?;
    println!("string at {}: {}", pointer, String::from_utf8_lossy(&value));

    manager.checkpoint()?;
    tran.commit()?;

    println!("allocated pages:    {}", manager.allocated_page_count());
    println!("bitmap pages:       {}", manager.bitmap_page_count());
    println!(
        "resident pages:     {} (limit {})",
        manager.resident_page_count(),
        config.in_memory_page_limit
    );
    Ok(())
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}
