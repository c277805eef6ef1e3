/// Prints the JSON schema of every listed decision model type.
///
/// The calling crate needs `schemars` and `serde_json` in scope.
#[macro_export]
macro_rules! decision_models_schemas_gen {
    [$($x:ty),*] => {
        vec![
            $(
                serde_json::to_string_pretty(&schemars::schema_for!($x))
                    .unwrap_or_else(|_| format!("{{\"title\": \"{}\"}}", stringify!($x))),
            )*
        ]
    };
}

/// Standard serialised bodies and category of a decision model, from its serde impls.
#[macro_export]
macro_rules! impl_decision_model_standard_parts {
    ($x:ty) => {
        fn body_as_json(&self) -> Option<String> {
            serde_json::to_string(self).ok()
        }

        fn body_as_msgpack(&self) -> Option<Vec<u8>> {
            rmp_serde::to_vec(self).ok()
        }

        fn body_as_cbor(&self) -> Option<Vec<u8>> {
            let mut b: Vec<u8> = Vec::new();
            if let Ok(_) = ciborium::into_writer(self, &mut b) {
                Some(b)
            } else {
                None
            }
        }

        fn category(&self) -> String {
            stringify!($x).to_string()
        }
    };
}
