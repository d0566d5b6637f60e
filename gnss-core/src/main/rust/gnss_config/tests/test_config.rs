use std::io::Write;
use gnss_config::{expand_env_refs, Credentials};

#[test]
fn test_env_refs () {
    std::env::set_var("GNSS_TEST_A", "alpha");
    std::env::remove_var("GNSS_TEST_B");

    assert_eq!( expand_env_refs("x/${GNSS_TEST_A}/y").unwrap(), "x/alpha/y");
    assert_eq!( expand_env_refs("${GNSS_TEST_B|GNSS_TEST_A}").unwrap(), "alpha");
    assert_eq!( expand_env_refs("${GNSS_TEST_B||fallback}").unwrap(), "fallback");
    assert!( expand_env_refs("${GNSS_TEST_B}").is_err());
    assert!( expand_env_refs("${GNSS_TEST_B").is_err()); // unterminated
    assert_eq!( expand_env_refs("no refs here").unwrap(), "no refs here");
}

#[test]
fn test_credentials_json () {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "{{\"username\": \"anon\", \"password\": \"sesame\"}}").unwrap();

    let cred = Credentials::from_file(f.path()).unwrap();
    assert_eq!( cred, Credentials { username: "anon".to_string(), password: "sesame".to_string() });
}

#[test]
fn test_credentials_lines () {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "user anon\npassword sesame\n").unwrap();

    let cred = Credentials::from_file(f.path()).unwrap();
    assert_eq!( cred.username, "anon");
    assert_eq!( cred.password, "sesame");
}
