pub mod ads1015;
pub mod adxl345;
pub mod outputs;
