use std::any::Any;

use assert_call::call;

use crate::{BaseStats, Record};

pub fn call_on_drop(s: &'static str) -> impl Any {
    struct OnDrop(&'static str);
    impl Drop for OnDrop {
        fn drop(&mut self) {
            call!("{}", self.0);
        }
    }
    OnDrop(s)
}

pub fn record(id: u32, name: &str, types: &[&str]) -> Record {
    Record {
        id,
        name: name.to_string(),
        types: types.iter().map(|t| t.to_string()).collect(),
        stats: BaseStats::default(),
    }
}

pub fn bulbasaur() -> Record {
    Record {
        id: 1,
        name: "Bulbasaur".to_string(),
        types: vec!["Grass".to_string(), "Poison".to_string()],
        stats: BaseStats {
            hp: 45,
            attack: 49,
            defense: 49,
            special_attack: 65,
            special_defense: 65,
            speed: 45,
        },
    }
}

pub const BULBASAUR_JSON: &str = r#"[{"id":1,"name":"Bulbasaur","type":["Grass","Poison"],"hp":45,"attack":49,"defense":49,"special_attack":65,"special_defense":65,"speed":45}]"#;
