use std::time::Duration as StdDuration;
use chrono::{Duration,TimeZone,Utc};

use gnss_archive::compress::CompressionRegistry;
use gnss_archive::{create_archive,Archive,ArchiveConfig};
use gnss_cache::{Cache,GetDataOpts};
use gnss_products::request::{Request,RequestStatus};
use gnss_products::{Cadence,ProductCatalog,ProductType};

fn rapid_orbits () -> ProductType {
    ProductType {
        type_code: "ORB".to_string(),
        subtype: "RAPID".to_string(),
        filename: "igr[wwww][d].sp3".to_string(),
        path: "products/[wwww]".to_string(),
        cadence: Cadence::Daily,
        supply_cadence: None,
        priority: 50,
        latency: StdDuration::from_secs(17*3600),
        retry_interval: StdDuration::from_secs(3600),
        max_delay: StdDuration::from_secs(14*86400),
        retention_days: 30,
        expires_days: 0,
        compression: "none".to_string(),
        valid_before: None,
        valid_after: None
    }
}

fn source_archive (dir: &std::path::Path) -> ArchiveConfig {
    ArchiveConfig {
        name: "igs".to_string(),
        uri: format!("file://{}", dir.display()),
        priority: 10,
        credentials: None,
        credentials_file: None,
        stations: vec!["*".to_string()],
        excluded_stations: Vec::new(),
        datatypes: Vec::new(),
        overrides: Vec::new(),
        max_downloads_per_connection: 0,
        readonly: true,
        timeout: StdDuration::from_secs(30),
        compression: None,
        auth_url: None
    }
}

struct Fixture {
    catalog: ProductCatalog,
    registry: CompressionRegistry,
    archives: Vec<Box<dyn Archive>>,
    cache: Cache,
    _src: tempfile::TempDir,
    _cache_dir: tempfile::TempDir
}

fn fixture () -> Fixture {
    let src = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();

    let catalog = ProductCatalog::new( vec![ rapid_orbits()]).unwrap();
    let registry = CompressionRegistry::default();
    let archives: Vec<Box<dyn Archive>> = vec![
        create_archive( &source_archive(src.path()), &catalog).unwrap()
    ];
    let cache = Cache::ephemeral( cache_dir.path(), &catalog).unwrap();

    Fixture { catalog, registry, archives, cache, _src: src, _cache_dir: cache_dir }
}

fn seed_orbit_file (fx: &Fixture) {
    // 2020-04-09 is GPS week 2100 day 4
    let path = fx._src.path().join("products/2100");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write( path.join("igr21004.sp3"), b"rapid orbits").unwrap();
}

fn day () -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap()
}

#[test]
fn test_add_request_idempotent () {
    let mut fx = fixture();
    let now = Utc.with_ymd_and_hms(2020, 4, 9, 9, 0, 0).unwrap();
    let req = Request::new("job1", "ORB", "RAPID", day(), day(), None);

    let first = fx.cache.add_request(&req, &fx.catalog, &fx.archives, &now).unwrap();
    let second = fx.cache.add_request(&req, &fx.catalog, &fx.archives, &now).unwrap();

    assert_eq!( fx.cache.index().request_count().unwrap(), 1);
    assert_eq!( fx.cache.index().job_count().unwrap(), 1);
    assert_eq!( first.status, second.status);
    assert_eq!( first.status, RequestStatus::Pending);
    assert_eq!( first.available_date, Some( Utc.with_ymd_and_hms(2020, 4, 9, 17, 0, 0).unwrap()));
}

#[test]
fn test_add_request_invalid_type () {
    let mut fx = fixture();
    let now = Utc.with_ymd_and_hms(2020, 4, 9, 9, 0, 0).unwrap();
    let req = Request::new("job1", "NOPE", "", day(), day(), None);

    let queued = fx.cache.add_request(&req, &fx.catalog, &fx.archives, &now).unwrap();
    assert_eq!( queued.status, RequestStatus::Invalid);
}

#[tokio::test]
async fn test_pending_then_ready () {
    let mut fx = fixture();
    let req = Request::new("job1", "ORB", "RAPID", day(), day(), None);

    // 09:00 - the product is published at 17:00, so the queued download stays pending
    let morning = Utc.with_ymd_and_hms(2020, 4, 9, 9, 0, 0).unwrap();
    let opts = GetDataOpts { queue: true, download: true };
    let result = fx.cache.get_data(&req, &fx.catalog, &fx.registry, &mut fx.archives, None, opts, &morning).await.unwrap();

    assert_eq!( result.request.status, RequestStatus::Pending);
    assert_eq!( result.request.available_date, Some( Utc.with_ymd_and_hms(2020, 4, 9, 17, 0, 0).unwrap()));
    assert!( result.next_check.unwrap() > result.request.available_date.unwrap());

    // nothing is due before the availability date
    let ready = fx.cache.fill_pending(&fx.catalog, &fx.registry, &mut fx.archives, &morning).await.unwrap();
    assert!( ready.is_empty());

    // 17:30 - the file exists now, fill_pending completes the request and reports the job
    seed_orbit_file(&fx);
    let evening = Utc.with_ymd_and_hms(2020, 4, 9, 17, 30, 0).unwrap();
    let ready = fx.cache.fill_pending(&fx.catalog, &fx.registry, &mut fx.archives, &evening).await.unwrap();
    assert_eq!( ready, vec!["job1".to_string()]);

    assert_eq!( fx.cache.index().file_count().unwrap(), 1);

    // retrieval delivers out of the cache and drops the request
    let target_dir = tempfile::tempdir().unwrap();
    let mut target_cfg = source_archive( target_dir.path());
    target_cfg.name = "target".to_string();
    target_cfg.readonly = false;
    let mut target = create_archive(&target_cfg, &fx.catalog).unwrap();

    let result = fx.cache.get_data(&req, &fx.catalog, &fx.registry, &mut fx.archives,
                                   Some(target.as_mut()), opts, &evening).await.unwrap();
    assert_eq!( result.request.status, RequestStatus::Completed);
    assert_eq!( std::fs::read( target_dir.path().join("products/2100/igr21004.sp3")).unwrap(), b"rapid orbits");
    assert_eq!( fx.cache.index().request_count().unwrap(), 0);
}

#[tokio::test]
async fn test_unqueued_request_is_removed () {
    let mut fx = fixture();
    seed_orbit_file(&fx);
    let now = Utc.with_ymd_and_hms(2020, 4, 10, 0, 0, 0).unwrap();
    let req = Request::new("job1", "ORB", "RAPID", day(), day(), None);

    let opts = GetDataOpts { queue: false, download: true };
    let result = fx.cache.get_data(&req, &fx.catalog, &fx.registry, &mut fx.archives, None, opts, &now).await.unwrap();

    assert_eq!( result.request.status, RequestStatus::Completed);
    assert!( result.next_check.is_none());
    assert_eq!( fx.cache.index().request_count().unwrap(), 0); // not kept
    assert_eq!( fx.cache.index().file_count().unwrap(), 1);    // the file stays cached
}

#[tokio::test]
async fn test_purge_monotonic () {
    let mut fx = fixture();
    seed_orbit_file(&fx);
    let now = Utc.with_ymd_and_hms(2020, 4, 10, 0, 0, 0).unwrap();
    let req = Request::new("job1", "ORB", "RAPID", day(), day(), None);

    let opts = GetDataOpts { queue: true, download: true };
    fx.cache.get_data(&req, &fx.catalog, &fx.registry, &mut fx.archives, None, opts, &now).await.unwrap();
    assert_eq!( fx.cache.index().job_count().unwrap(), 1);
    assert_eq!( fx.cache.index().file_count().unwrap(), 1);

    let t1 = now + Duration::days(3);   // before job expiry (retention 7d)
    let t2 = now + Duration::days(60);  // after job and file expiry

    fx.cache.purge(&t1).unwrap();
    assert_eq!( fx.cache.index().job_count().unwrap(), 1);
    assert_eq!( fx.cache.index().request_count().unwrap(), 1);

    fx.cache.purge(&t2).unwrap();
    assert_eq!( fx.cache.index().job_count().unwrap(), 0);
    assert_eq!( fx.cache.index().request_count().unwrap(), 0);
    assert_eq!( fx.cache.index().file_count().unwrap(), 0);

    // purge(t1); purge(t2) left the same index as purge(t2) alone
    let mut fx2 = fixture();
    seed_orbit_file(&fx2);
    fx2.cache.get_data(&req, &fx2.catalog, &fx2.registry, &mut fx2.archives, None, opts, &now).await.unwrap();
    fx2.cache.purge(&t2).unwrap();
    assert_eq!( fx2.cache.index().job_count().unwrap(), 0);
    assert_eq!( fx2.cache.index().request_count().unwrap(), 0);
    assert_eq!( fx2.cache.index().file_count().unwrap(), 0);
}

#[tokio::test]
async fn test_file_outlives_job_until_expiry () {
    let mut fx = fixture();
    seed_orbit_file(&fx);
    let now = Utc.with_ymd_and_hms(2020, 4, 10, 0, 0, 0).unwrap();
    let req = Request::new("job1", "ORB", "RAPID", day(), day(), None);

    let opts = GetDataOpts { queue: true, download: true };
    fx.cache.get_data(&req, &fx.catalog, &fx.registry, &mut fx.archives, None, opts, &now).await.unwrap();

    let cached = fx.cache.cached_file_path("products/2100/igr21004.sp3");
    assert!( cached.is_file());

    // job expires after 7 days retention, the unlinked file only after its own 30
    fx.cache.purge( &(now + Duration::days(10))).unwrap();
    assert_eq!( fx.cache.index().job_count().unwrap(), 0);
    assert_eq!( fx.cache.index().file_count().unwrap(), 1);
    assert!( cached.is_file());

    fx.cache.purge( &(now + Duration::days(35))).unwrap();
    assert_eq!( fx.cache.index().file_count().unwrap(), 0);
    assert!( !cached.is_file()); // disk delete goes with the index delete
}
