use std::time::Duration as StdDuration;
use chrono::{TimeZone,Utc};

use gnss_products::{Cadence,ProductCatalog,ProductType,SubtypeSpec};
use gnss_products::avail::{check_availability,ProductAvailability};
use gnss_products::request::{Request,RequestStatus};
use gnss_products::template::{expand,file_specs,parse_filename,TemplateVars};

fn orbit_product (subtype: &str, priority: u32) -> ProductType {
    ProductType {
        type_code: "ORB".to_string(),
        subtype: subtype.to_string(),
        filename: "igs[wwww][d].sp3.Z".to_string(),
        path: "products/[wwww]".to_string(),
        cadence: Cadence::Daily,
        supply_cadence: None,
        priority,
        latency: StdDuration::from_secs(17*3600),
        retry_interval: StdDuration::from_secs(3600),
        max_delay: StdDuration::from_secs(14*86400),
        retention_days: 30,
        expires_days: 0,
        compression: "compress".to_string(),
        valid_before: None,
        valid_after: None
    }
}

fn obs_product () -> ProductType {
    ProductType {
        type_code: "OBS".to_string(),
        subtype: "DAILY".to_string(),
        filename: "[ssss][ddd]0.[yy]d.gz".to_string(),
        path: "[yyyy]/[ddd]".to_string(),
        cadence: Cadence::Daily,
        supply_cadence: None,
        priority: 100,
        latency: StdDuration::from_secs(6*3600),
        retry_interval: StdDuration::from_secs(3600),
        max_delay: StdDuration::from_secs(7*86400),
        retention_days: 10,
        expires_days: 0,
        compression: "hatanaka+gzip".to_string(),
        valid_before: None,
        valid_after: None
    }
}

#[test]
fn test_expand_tokens () {
    let t = Utc.with_ymd_and_hms(2020, 4, 9, 13, 0, 0).unwrap(); // doy 100, GPS week 2100 day 4
    let vars = TemplateVars { time: t, station: Some("GSHT"), job_id: "pnz1", type_code: "OBS", subtype: "DAILY" };

    assert_eq!( expand("[ssss][ddd]0.[yy]d.gz", &vars).unwrap(), "gsht1000.20d.gz");
    assert_eq!( expand("[SSSS]_[yyyy][ddd][h].[type]", &vars).unwrap(), "GSHT_2020100n.obs");
    assert_eq!( expand("igs[wwww][d].sp3", &vars).unwrap(), "igs21004.sp3");
    assert_eq!( expand("[job]/[mm]/[dd]/[hh]", &vars).unwrap(), "pnz1/04/09/13");
    assert!( expand("[bogus]", &vars).is_err());
}

#[test]
fn test_expand_day_offsets () {
    let t = Utc.with_ymd_and_hms(2020, 12, 30, 0, 0, 0).unwrap();
    let vars = TemplateVars { time: t, station: None, job_id: "j", type_code: "ORB", subtype: "FINAL" };

    // +14 days crosses the year boundary
    assert_eq!( expand("[yyyy+14][ddd+14]", &vars).unwrap(), "2021013");
    assert_eq!( expand("[ddd-2]", &vars).unwrap(), "363");
}

#[test]
fn test_mixed_case_station_preserved () {
    let t = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();
    let vars = TemplateVars { time: t, station: Some("McMd"), job_id: "j", type_code: "OBS", subtype: "DAILY" };

    assert_eq!( expand("[ssss]", &vars).unwrap(), "McMd");
    assert_eq!( expand("[SSSS]", &vars).unwrap(), "McMd");
}

#[test]
fn test_template_round_trip () {
    let pt = obs_product();
    let t = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();
    let req = Request::new("job1", "OBS", "DAILY", t, t, Some("GSHT".to_string()));

    let specs = file_specs(&pt, &req).unwrap();
    assert_eq!( specs.len(), 1);
    assert_eq!( specs[0].filename, "gsht1000.20d.gz");
    assert_eq!( specs[0].path, "2020/100");

    let parsed = parse_filename(&pt.filename, &specs[0].filename).unwrap();
    assert_eq!( parsed.time, Some(t));
    assert_eq!( parsed.station.as_deref().map(str::to_uppercase), Some("GSHT".to_string()));

    // a non-matching name does not parse
    assert!( parse_filename(&pt.filename, "other1000.20d.gz_x").is_none());
}

#[test]
fn test_file_specs_per_bucket () {
    let pt = orbit_product("FINAL", 100);
    let start = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 4, 11, 0, 0, 0).unwrap();
    let req = Request::new("job1", "ORB", "FINAL", start, end, None);

    let specs = file_specs(&pt, &req).unwrap();
    assert_eq!( specs.len(), 3);
    assert_eq!( specs[0].filename, "igs21004.sp3.Z");
    assert_eq!( specs[1].filename, "igs21005.sp3.Z");
    assert_eq!( specs[2].filename, "igs21006.sp3.Z");
    assert!( specs.windows(2).all( |w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn test_subtype_selection () {
    let catalog = ProductCatalog::new( vec![
        orbit_product("FINAL", 100),
        orbit_product("RAPID", 50),
        orbit_product("ULTRA", 10),
        orbit_product("BROADCAST", 0)
    ]).unwrap();

    let any: Vec<&str> = catalog.select("ORB", &SubtypeSpec::Any).iter().map(|pt| pt.subtype.as_str()).collect();
    assert_eq!( any, vec!["FINAL","RAPID","ULTRA"]); // priority 0 excluded, descending priority

    let or_higher: Vec<&str> = catalog.select("ORB", &SubtypeSpec::parse("RAPID+")).iter().map(|pt| pt.subtype.as_str()).collect();
    assert_eq!( or_higher, vec!["FINAL","RAPID"]);

    let exact: Vec<&str> = catalog.select("ORB", &SubtypeSpec::parse("ULTRA")).iter().map(|pt| pt.subtype.as_str()).collect();
    assert_eq!( exact, vec!["ULTRA"]);
}

#[test]
fn test_catalog_rejects_duplicates () {
    assert!( ProductCatalog::new( vec![ orbit_product("FINAL", 100), orbit_product("FINAL", 100)]).is_err());
}

#[test]
fn test_availability_prediction () {
    let pt = orbit_product("RAPID", 50);
    let day = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();

    let now = Utc.with_ymd_and_hms(2020, 4, 9, 9, 0, 0).unwrap();
    match check_availability(&pt, &day, &day, &now) {
        ProductAvailability::At { available_time, fail_time } => {
            assert_eq!( available_time, Utc.with_ymd_and_hms(2020, 4, 9, 17, 0, 0).unwrap());
            assert_eq!( fail_time, available_time + chrono::Duration::days(14));
        }
        other => panic!("expected At, got {:?}", other)
    }
}

#[test]
fn test_rolling_product_expires () {
    let mut pt = orbit_product("ULTRA", 10);
    pt.expires_days = 2;
    let day = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();

    assert!( matches!( check_availability(&pt, &day, &day, &now), ProductAvailability::Never { .. }));

    let recent = Utc.with_ymd_and_hms(2020, 4, 8, 0, 0, 0).unwrap();
    assert!( matches!( check_availability(&pt, &recent, &recent, &now), ProductAvailability::At { .. }));
}

#[test]
fn test_validity_fences () {
    let mut pt = orbit_product("FINAL", 100);
    pt.valid_after = Some( Utc.with_ymd_and_hms(1994, 1, 1, 0, 0, 0).unwrap());
    let day = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

    assert!( matches!( check_availability(&pt, &day, &day, &now), ProductAvailability::Never { .. }));
}

#[test]
fn test_request_validation () {
    let catalog = ProductCatalog::new( vec![ orbit_product("FINAL", 100), obs_product()]).unwrap();
    let t = Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap();

    let mut req = Request::new("j", "OBS", "DAILY", t, t, None);
    assert!( req.validate(&catalog).is_err()); // station required

    req.station = Some("GSHT".to_string());
    assert!( req.validate(&catalog).is_ok());

    let req = Request::new("j", "ORB", "FINAL", t, t, Some("GSHT".to_string()));
    assert!( req.validate(&catalog).is_err()); // station not taken

    let req = Request::new("j", "XXX", "", t, t, None);
    assert!( req.validate(&catalog).is_err()); // unknown type

    assert_eq!( RequestStatus::Completed.severity() > RequestStatus::Delayed.severity(), true);
}
