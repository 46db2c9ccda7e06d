use std::{
    env,
    str::FromStr,
};

mod reshape;

fn test_scale() -> f64 {
    env::var("RAIDSYNC_TORTURE_SCALE")
        .map(|s| f64::from_str(&s)
             .expect("RAIDSYNC_TORTURE_SCALE must be a float")
         ).unwrap_or(1.0)
}
