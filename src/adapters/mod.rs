//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                 | Connects to               |
//! |-------------|----------------------------|---------------------------|
//! | `ble`       | (used by `hardware`)       | Bluedroid GATT server     |
//! | `hardware`  | SensorPort                 | LIS3DH (I²C), ADC, GPIO   |
//! |             | RadioPort                  | BLE notify + advertising  |
//! |             | IndicatorPort              | LEDC RGB LED, haptic      |
//! | `log_sink`  | EventSink                  | Serial log output         |
//! | `time`      | (clock for handlers)       | esp_timer                 |
//! | `device_id` | (identity for the service) | eFuse MAC                 |

pub mod ble;
pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod time;
