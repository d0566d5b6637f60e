use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{Duration,TimeZone,Utc};

use gnss_daily::markers::{DateState,DayMarkers,MarkerGates};
use gnss_daily::order::{day_offsets,visit_dates,ProcessingOrder};
use gnss_daily::subst::{expand,expand_for_list,parse_for_spec,VarContext};
use gnss_daily::{DailyConfig,DailyScheduler,DayContext};

fn var_ctx () -> VarContext {
    let mut vars = HashMap::new();
    vars.insert( "run".to_string(), "pnz".to_string());
    vars.insert( "empty".to_string(), "".to_string());
    vars.insert( "indirect".to_string(), "${run}_x".to_string());
    VarContext::new( Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap(), vars)
}

#[test]
fn test_binary_fill_order () {
    assert_eq!( day_offsets(16, ProcessingOrder::BinaryFill, 1),
        vec![0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15]);

    // non power of two ranges keep full coverage without duplicates
    let mut offsets = day_offsets(11, ProcessingOrder::BinaryFill, 1);
    offsets.sort();
    assert_eq!( offsets, (0..11).collect::<Vec<_>>());
}

#[test]
fn test_visit_orders () {
    let start = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 4, 5, 0, 0, 0).unwrap();

    let fw = visit_dates(&start, &end, ProcessingOrder::Forwards, 1);
    assert_eq!( fw.len(), 5);
    assert_eq!( fw[0], start);
    assert_eq!( fw[4], end);

    let bw = visit_dates(&start, &end, ProcessingOrder::Backwards, 1);
    assert_eq!( bw[0], end);
    assert_eq!( bw[4], start);

    let stepped = visit_dates(&start, &end, ProcessingOrder::Forwards, 2);
    assert_eq!( stepped.len(), 3);
    assert_eq!( stepped[1], start + Duration::days(2));

    let mut random = visit_dates(&start, &end, ProcessingOrder::Random, 1);
    random.sort();
    assert_eq!( random, fw);

    assert!( visit_dates(&end, &start, ProcessingOrder::Forwards, 1).is_empty());
}

#[test]
fn test_substitution () {
    let ctx = var_ctx(); // 2020-04-09 = doy 100, GPS week 2100 day 4

    assert_eq!( expand("${yyyy}/${ddd}", &ctx).unwrap(), "2020/100");
    assert_eq!( expand("${wwww}${d}", &ctx).unwrap(), "21004");
    assert_eq!( expand("${yyyy+14}", &ctx).unwrap(), "2020");
    assert_eq!( expand("${ddd-9}", &ctx).unwrap(), "091");
    assert_eq!( expand("${run}/data", &ctx).unwrap(), "pnz/data");
    assert_eq!( expand("${indirect}", &ctx).unwrap(), "pnz_x"); // two passes
    assert!( expand("${nope}", &ctx).is_err());
}

#[test]
fn test_conditional_substitution () {
    let ctx = var_ctx();

    assert_eq!( expand("${run?have:none}", &ctx).unwrap(), "have");
    assert_eq!( expand("${empty?have:none}", &ctx).unwrap(), "none");
    assert_eq!( expand("${undefined?have:none}", &ctx).unwrap(), "none");
}

#[test]
fn test_cycle_detection () {
    let mut vars = HashMap::new();
    vars.insert( "a".to_string(), "${b}".to_string());
    vars.insert( "b".to_string(), "${a}".to_string());
    let ctx = VarContext::new( Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap(), vars);

    assert!( expand("${a}", &ctx).is_err());
}

#[test]
fn test_for_list () {
    let ctx = var_ctx();

    let spec = parse_for_spec("for -2 to 0 ${yyyy}/${ddd}").unwrap().unwrap();
    assert_eq!( spec.from, -2);
    assert_eq!( spec.to, 0);
    assert_eq!( spec.step, 1);
    assert_eq!( spec.item, "${yyyy}/${ddd}");

    let mut all = |_v: &str| true;
    assert_eq!( expand_for_list(&spec, &ctx, &mut all).unwrap(), "2020/098 2020/099 2020/100");

    // plain values are not for-lists
    assert!( parse_for_spec("${yyyy}/${ddd}").unwrap().is_none());

    // if exists filters, need is enforced on what survives
    let spec = parse_for_spec("for -2 to 0 if exists need 2 ${ddd}").unwrap().unwrap();
    assert!( spec.if_exists);
    assert_eq!( spec.need, 2);

    let mut only_100 = |v: &str| v == "100";
    assert!( expand_for_list(&spec, &ctx, &mut only_100).is_err()); // 1 < need 2

    let mut not_99 = |v: &str| v != "099";
    assert_eq!( expand_for_list(&spec, &ctx, &mut not_99).unwrap(), "098 100");

    let spec = parse_for_spec("for 4 to 0 step -2 ${ddd}").unwrap().unwrap();
    assert_eq!( expand_for_list(&spec, &ctx, &mut all).unwrap(), "104 102 100");
}

#[test]
fn test_marker_state_machine () {
    let dir = tempfile::tempdir().unwrap();
    let day = DayMarkers::new( dir.path());
    let date = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2020, 4, 20, 0, 0, 0).unwrap();
    let gates = MarkerGates { lock_expiry_days: 0.9, retry_interval_days: 1.0, retry_max_age_days: 0 };

    assert_eq!( day.classify(&date, &now, &gates, None).unwrap(), DateState::Enterable);

    day.write_lock(&now).unwrap();
    assert_eq!( day.classify(&date, &now, &gates, None).unwrap(), DateState::Busy);

    // a lock whose (mirrored) age exceeds the expiry may be taken over
    let old = StdDuration::from_secs(86400);
    assert_eq!( day.classify(&date, &now, &gates, Some(old)).unwrap(), DateState::Takeover);
    day.release_lock().unwrap();

    // a young fail marker holds the date, retry_interval 0 frees it immediately
    day.write_fail("boom").unwrap();
    assert_eq!( day.classify(&date, &now, &gates, None).unwrap(), DateState::Held);
    let eager = MarkerGates { retry_interval_days: 0.0, ..gates };
    assert_eq!( day.classify(&date, &now, &eager, None).unwrap(), DateState::Retry);

    // dates beyond the retry age window stay held no matter how old the marker
    let aged = MarkerGates { retry_interval_days: 0.0, retry_max_age_days: 5, ..gates };
    assert_eq!( day.classify(&date, &now, &aged, None).unwrap(), DateState::Held);
    let recent_now = date + Duration::days(3);
    assert_eq!( day.classify(&date, &recent_now, &aged, None).unwrap(), DateState::Retry);

    // completion wins over everything but skip
    day.write_complete("").unwrap();
    assert_eq!( day.classify(&date, &now, &gates, None).unwrap(), DateState::Done);

    day.write_skip("not wanted").unwrap();
    assert_eq!( day.classify(&date, &now, &gates, None).unwrap(), DateState::Skipped);
}

fn scheduler_config (base: &std::path::Path, start: &str, end: &str) -> DailyConfig {
    DailyConfig {
        base_dir: base.to_string_lossy().to_string(),
        target_dir: "${base_dir}/${yyyy}/${ddd}".to_string(),
        start_date: start.to_string(),
        end_date: end.to_string(),
        processing_order: ProcessingOrder::Forwards,
        date_increment: 1,
        variables: HashMap::new(),
        prerequisites: Vec::new(),
        lock_expiry_days: 0.9,
        retry_interval_days: 0.0,
        retry_max_age_days: 0,
        max_runtime: None,
        max_days_processed_per_run: 0,
        stop_file: None,
        max_consecutive_fails: 0,
        max_consecutive_prerequisite_fails: 0,
        clean_on_start: false,
        object_store: None
    }
}

#[tokio::test]
async fn test_run_processes_each_date_once () {
    let base = tempfile::tempdir().unwrap();
    let cfg = scheduler_config( base.path(), "2020/100", "2020/102");
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let mut seen: Vec<String> = Vec::new();
    let mut callback = |ctx: &DayContext| {
        seen.push( ctx.date.format("%Y-%j").to_string());
        std::fs::write( ctx.target_dir.join("result.out"), b"done")?;
        Ok(())
    };

    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.processed, 3);
    assert_eq!( report.completed, 3);
    assert_eq!( seen, vec!["2020-100","2020-101","2020-102"]);
    assert!( base.path().join("2020/100/processing.complete").is_file());
    assert!( !base.path().join("2020/100/processing.lock").exists());

    // a second run skips everything
    let mut second = |_ctx: &DayContext| -> anyhow::Result<()> { panic!("must not be called") };
    let report = scheduler.run(&mut second).await.unwrap();
    assert_eq!( report.processed, 0);
}

#[tokio::test]
async fn test_run_records_failures () {
    let base = tempfile::tempdir().unwrap();
    let cfg = scheduler_config( base.path(), "2020/100", "2020/102");
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let mut callback = |ctx: &DayContext| {
        if ctx.date.format("%j").to_string() == "101" {
            anyhow::bail!("processor crashed");
        }
        Ok(())
    };

    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.completed, 2);
    assert_eq!( report.failed, 1);
    assert!( base.path().join("2020/101/processing.failed").is_file());

    // retry_interval 0: the failed date is retried on the next run and can recover
    let mut recover = |_ctx: &DayContext| -> anyhow::Result<()> { Ok(()) };
    let report = scheduler.run(&mut recover).await.unwrap();
    assert_eq!( report.completed, 1);
    assert!( base.path().join("2020/101/processing.complete").is_file());
    assert!( !base.path().join("2020/101/processing.failed").exists());
}

#[tokio::test]
async fn test_max_consecutive_fails_unwinds_markers () {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = scheduler_config( base.path(), "2020/100", "2020/110");
    cfg.max_consecutive_fails = 2;
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let mut callback = |_ctx: &DayContext| -> anyhow::Result<()> { anyhow::bail!("always broken") };
    let report = scheduler.run(&mut callback).await.unwrap();

    assert_eq!( report.failed, 2);
    assert!( report.stop_reason.is_some());
    // the markers from this broken run were removed so the next run retries
    assert!( !base.path().join("2020/100/processing.failed").exists());
    assert!( !base.path().join("2020/101/processing.failed").exists());
}

#[tokio::test]
async fn test_stop_file_and_max_days () {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = scheduler_config( base.path(), "2020/100", "2020/110");
    cfg.max_days_processed_per_run = 2;
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let mut callback = |_ctx: &DayContext| -> anyhow::Result<()> { Ok(()) };
    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.processed, 2);
    assert!( report.stop_reason.is_some());

    let mut cfg = scheduler_config( base.path(), "2020/100", "2020/110");
    cfg.stop_file = Some("stop.now".to_string());
    let scheduler = DailyScheduler::new(cfg).unwrap();
    scheduler.request_stop().unwrap();

    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.processed, 0);
    assert!( report.stop_reason.is_some());

    scheduler.clear_stop().unwrap();
    let report = scheduler.run(&mut callback).await.unwrap();
    assert!( report.processed > 0);
}

#[tokio::test]
async fn test_prerequisites_gate_processing () {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = scheduler_config( base.path(), "2020/100", "2020/100");
    cfg.prerequisites = vec!["inputs/${yyyy}_${ddd}.dat".to_string()];
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let called = std::cell::Cell::new(false);
    let mut callback = |_ctx: &DayContext| { called.set(true); Ok(()) };

    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.processed, 0);
    assert!( !called.get());
    assert!( !base.path().join("2020/100/processing.complete").exists());

    std::fs::create_dir_all( base.path().join("inputs")).unwrap();
    std::fs::write( base.path().join("inputs/2020_100.dat"), b"x").unwrap();

    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.completed, 1);
    assert!( called.get());
}

#[tokio::test]
async fn test_object_store_mirror () {
    let base = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();

    let mut cfg = scheduler_config( base.path(), "2020/100", "2020/100");
    cfg.object_store = Some( format!("file://{}", store_dir.path().display()));
    let scheduler = DailyScheduler::new(cfg).unwrap();

    let mut callback = |ctx: &DayContext| {
        std::fs::write( ctx.target_dir.join("result.out"), b"done")?;
        Ok(())
    };
    let report = scheduler.run(&mut callback).await.unwrap();
    assert_eq!( report.completed, 1);

    // markers and scratch output were mirrored, the lock was removed again
    assert!( store_dir.path().join("2020/100/processing.complete").is_file());
    assert!( store_dir.path().join("2020/100/result.out").is_file());
    assert!( !store_dir.path().join("2020/100/processing.lock").exists());

    // a second worker sharing the store sees the mirrored completion
    let base2 = tempfile::tempdir().unwrap();
    let mut cfg2 = scheduler_config( base2.path(), "2020/100", "2020/100");
    cfg2.object_store = Some( format!("file://{}", store_dir.path().display()));
    let scheduler2 = DailyScheduler::new(cfg2).unwrap();

    let mut second = |_ctx: &DayContext| -> anyhow::Result<()> { panic!("must not be called") };
    let report = scheduler2.run(&mut second).await.unwrap();
    assert_eq!( report.processed, 0);
}
