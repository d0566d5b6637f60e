use chrono::{Duration,TimeZone,Utc};
use gnss_common::datetime::*;

#[test]
fn test_gps_week () {
    // 2020-01-01 was a Wednesday in GPS week 2086
    let dt = Utc.with_ymd_and_hms(2020, 1, 1, 12, 30, 0).unwrap();
    assert_eq!( gps_week(&dt), 2086);
    assert_eq!( gps_week_day(&dt), 3);
    assert_eq!( day_of_year(&dt), 1);
}

#[test]
fn test_hour_letter () {
    assert_eq!( hour_letter(0), 'a');
    assert_eq!( hour_letter(23), 'x');
    assert_eq!( hour_of_letter('a'), Some(0));
    assert_eq!( hour_of_letter('X'), Some(23));
    assert_eq!( hour_of_letter('z'), None);
}

#[test]
fn test_bucket_alignment () {
    let step = Duration::hours(6);
    let t0 = Utc.with_ymd_and_hms(2020, 4, 9, 7, 12, 44).unwrap();
    let bucket = floor_time(&t0, step);
    assert_eq!( bucket, Utc.with_ymd_and_hms(2020, 4, 9, 6, 0, 0).unwrap());

    // every t' within [bucket, bucket+step) maps to the same bucket
    for offs in [0i64, 1, 3600, 6*3600 - 1] {
        let t = bucket + Duration::seconds(offs);
        assert_eq!( floor_time(&t, step), bucket);
    }
    assert_ne!( floor_time(&(bucket + step), step), bucket);
}

#[test]
fn test_weekly_buckets_align_to_gps_weeks () {
    let step = Duration::days(7);
    let dt = Utc.with_ymd_and_hms(2020, 1, 1, 3, 0, 0).unwrap();
    let bucket = floor_time(&dt, step);
    assert_eq!( gps_week_day(&bucket), 0); // Sunday
    assert_eq!( gps_week(&bucket), 2086);
}

#[test]
fn test_time_buckets () {
    let step = Duration::days(1);
    let start = Utc.with_ymd_and_hms(2020, 4, 9, 22, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 4, 11, 2, 0, 0).unwrap();
    let buckets = time_buckets(&start, &end, step);

    assert_eq!( buckets.len(), 3);
    assert_eq!( buckets[0], Utc.with_ymd_and_hms(2020, 4, 9, 0, 0, 0).unwrap());
    assert_eq!( buckets[2], Utc.with_ymd_and_hms(2020, 4, 11, 0, 0, 0).unwrap());

    // empty interval
    assert!( time_buckets(&end, &start, step).is_empty());
}

#[test]
fn test_parse_gnss_date () {
    let expected = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    assert_eq!( parse_gnss_date("2020-01-01"), Some(expected));
    assert_eq!( parse_gnss_date("2020/001"), Some(expected));
    assert_eq!( parse_gnss_date("2086/3"), Some(expected));
    assert_eq!( parse_gnss_date("garbage"), None);
}
