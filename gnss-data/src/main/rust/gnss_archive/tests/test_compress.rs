use gnss_archive::compress::{CompressionRegistry,CompressionType,SuffixRule};

fn codec (name: &str, compress: &str, uncompress: &str, presuffix: &str, postsuffix: &str) -> CompressionType {
    CompressionType {
        name: name.to_string(),
        compress: Some(compress.to_string()),
        uncompress: Some(uncompress.to_string()),
        presuffix: presuffix.to_string(),
        postsuffix: postsuffix.to_string()
    }
}

fn registry () -> CompressionRegistry {
    CompressionRegistry::new(
        vec![
            codec("gzip", "gzip -c $in", "gzip -d -c $in", "", ".gz"),
            codec("compress", "compress -c $in", "uncompress -c $in", "", ".Z"),
            codec("hatanaka", "rnx2crx $in - ", "crx2rnx $in - ", "o", "d")
        ],
        vec![
            SuffixRule { suffix: ".gz".to_string(), compression: "gzip".to_string() },
            SuffixRule { suffix: ".Z".to_string(), compression: "compress".to_string() },
            SuffixRule { suffix: "d.Z".to_string(), compression: "hatanaka+compress".to_string() },
            SuffixRule { suffix: "d.gz".to_string(), compression: "hatanaka+gzip".to_string() }
        ]
    ).unwrap()
}

#[test]
fn test_pipeline_parsing () {
    let reg = registry();

    assert!( reg.pipeline("none").unwrap().is_empty());
    assert!( reg.pipeline("").unwrap().is_empty());
    assert_eq!( reg.pipeline("gzip").unwrap().len(), 1);

    let p = reg.pipeline("hatanaka+compress").unwrap();
    assert_eq!( p.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["hatanaka","compress"]);

    assert!( reg.pipeline("bogus").is_err());
}

#[test]
fn test_registry_rejects_unknown_suffix_codec () {
    let r = CompressionRegistry::new(
        vec![ codec("gzip", "gzip -c $in", "gzip -d -c $in", "", ".gz")],
        vec![ SuffixRule { suffix: ".Z".to_string(), compression: "compress".to_string() }]
    );
    assert!( r.is_err());
}

#[test]
fn test_suffix_inference_longest_wins () {
    let reg = registry();

    assert_eq!( reg.infer_from_suffix("gsht1000.20d.gz"), Some("hatanaka+gzip"));
    assert_eq!( reg.infer_from_suffix("igs21004.sp3.gz"), Some("gzip"));
    assert_eq!( reg.infer_from_suffix("gsht1000.20d.Z"), Some("hatanaka+compress"));
    assert_eq!( reg.infer_from_suffix("igs21004.sp3"), None);
}

#[test]
fn test_converted_filename () {
    let reg = registry();

    // hatanaka+compress -> none: drop .Z, then d -> o
    assert_eq!( reg.converted_filename("gsht1000.20d.Z", "hatanaka+compress", "none").unwrap(), "gsht1000.20o");

    // hatanaka+compress -> hatanaka+gzip: common hatanaka stage stays untouched
    assert_eq!( reg.converted_filename("gsht1000.20d.Z", "hatanaka+compress", "hatanaka+gzip").unwrap(), "gsht1000.20d.gz");

    // none -> gzip
    assert_eq!( reg.converted_filename("igs21004.sp3", "none", "gzip").unwrap(), "igs21004.sp3.gz");

    // identical pipelines are the identity
    assert_eq!( reg.converted_filename("x.gz", "gzip", "gzip").unwrap(), "x.gz");
}

#[test]
fn test_convert_runs_stages () {
    // stand-in codecs built from coreutils so the pipeline mechanics are testable
    let reg = CompressionRegistry::new(
        vec![
            codec("wrap", "cp $in $out", "cp $in $out", "", ".w"),
            codec("pipe", "cat $in", "cat $in", "", ".p")
        ],
        Vec::new()
    ).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("data.txt");
    std::fs::write(&input, b"payload").unwrap();

    // no-op conversion returns the input itself
    let same = reg.convert(&input, "none", "none", tmp.path()).unwrap();
    assert_eq!( same, input);

    // wrap -> pipe runs one uncompress ($out substitution) and one compress (stdout capture)
    let out = reg.convert(&input, "wrap", "pipe", tmp.path()).unwrap();
    assert_ne!( out, input);
    assert_eq!( std::fs::read(&out).unwrap(), b"payload");
    assert!( input.is_file()); // input untouched

    // a failing stage surfaces as a compression error
    let bad = CompressionRegistry::new(
        vec![ codec("bad", "false", "false", "", ".b")], Vec::new()).unwrap();
    assert!( bad.convert(&input, "bad", "none", tmp.path()).is_err());
}
