pub mod sensor;
pub mod simulated_sensor;

#[cfg(target_os = "espidf")]
pub mod moisture_sensor;
