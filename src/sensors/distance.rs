// Voltage ratio to distance conversion for the Sharp IR rangers
//
// The analog board reports the voltage ratio scaled by 1000 ("sensor value").
// Outside each model's supported band the reading is out of range.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrModel {
    /// Sharp 2D120X, roughly 4-30cm
    #[default]
    Sharp2D120X,
    /// Sharp 2Y0A21, roughly 10-80cm
    Sharp2Y0A21,
}

impl IrModel {
    /// Convert a sensor value (ratio x 1000) to centimetres
    pub fn to_centimetres(self, sensor_value: u16) -> Option<f32> {
        let v = f32::from(sensor_value);
        match self {
            IrModel::Sharp2D120X if v > 80.0 && v < 530.0 => Some(2076.0 / (v - 11.0)),
            IrModel::Sharp2Y0A21 if v > 80.0 && v < 500.0 => Some(4800.0 / (v - 20.0)),
            _ => None,
        }
    }
}
