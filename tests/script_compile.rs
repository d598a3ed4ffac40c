use std::fs;

use kestrel_lua::pool::{CollectorConfig, InterpreterInstance};

#[test]
fn bundled_scripts_compile() {
    let instance = InterpreterInstance::create(&CollectorConfig::default()).expect("create instance");
    let mut compiled = 0;
    for entry in fs::read_dir("assets/scripts").expect("read scripts dir") {
        let path = entry.expect("dir entry").path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("lua") {
            continue;
        }
        let source = fs::read_to_string(&path).expect("read script");
        instance
            .lua()
            .load(&source)
            .set_name(format!("@{}", path.display()))
            .into_function()
            .unwrap_or_else(|err| panic!("{} should compile: {err}", path.display()));
        compiled += 1;
    }
    assert!(compiled >= 3, "expected the bundled scripts, found {compiled}");
}
