use uuid::{uuid, Uuid};

/**
 * How long (milliseconds) to wait before scanning again after a failed scan or connection attempt.
 */
pub const CONNECT_DELAY: u64 = 5000;

/**
 * How often (milliseconds) to check whether the subscribed peripheral is still connected.
 */
pub const POLL_DELAY: u64 = 1000;

/**
 * How long (milliseconds) a single scan for advertising peripherals lasts.
 */
pub const SCAN_WINDOW: u64 = 5000;

/**
 * How long (milliseconds) connecting, discovering services and subscribing may take.
 */
pub const CONNECT_DEADLINE: u64 = 10000;

/**
 * How long (milliseconds) a scan may overrun its window before it is abandoned.
 */
pub const SCAN_DEADLINE_MARGIN: u64 = 5000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * Substring of the local name advertised by the torque rig.
 */
pub const DEFAULT_DEVICE_NAME: &str = "Mini4WD_Torque";

/**
 * The UUID of the Bluetooth BLE service exposing the sensor readings.
 */
pub const SENSOR_SERVICE: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/**
 * The UUID of the characteristic that notifies JSON encoded sensor readings.
 */
pub const SENSOR_DATA_CHARACTERISTIC: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");
