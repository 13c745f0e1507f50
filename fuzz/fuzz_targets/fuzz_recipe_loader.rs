#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(file) = mixer_config::load_recipe_toml(data) else {
        return;
    };
    if file.validate().is_err() {
        return;
    }
    // A validated recipe must always convert.
    let recipe = mixer_core::Recipe::try_from(&file);
    assert!(recipe.is_ok(), "validated recipe failed to convert: {file:?}");
});
