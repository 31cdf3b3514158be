//! Panic injection hooks (feature: `failpoints`).
//!
//! `fail_point!("name")` expands to nothing unless the feature is enabled.
//! With the feature, it panics while `name` is armed.

#[cfg(feature = "failpoints")]
mod registry {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    static ARMED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

    pub fn arm(name: &str) {
        if let Ok(mut armed) = ARMED.lock() {
            armed.insert(name.to_string());
        }
    }

    pub fn disarm(name: &str) {
        if let Ok(mut armed) = ARMED.lock() {
            armed.remove(name);
        }
    }

    pub fn is_armed(name: &str) -> bool {
        ARMED.lock().map(|a| a.contains(name)).unwrap_or(false)
    }
}

#[cfg(feature = "failpoints")]
pub use registry::{arm, disarm, is_armed};

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        if $crate::failpoints::is_armed($name) {
            panic!("failpoint triggered: {}", $name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        let _ = $name;
    };
}
