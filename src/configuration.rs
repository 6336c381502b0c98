pub mod main_configuration;
