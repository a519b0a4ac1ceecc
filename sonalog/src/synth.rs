//! Synthetic log generation.
//!
//! Produces small, well-formed log files in either format without any
//! recording hardware. Used by the `sonalog synth` command for demos and by
//! the test suite for every scanner, index and session test.

use sonalog_core::format::{framed, tagged};
use sonalog_core::record::{ChannelData, Fathometer, Navigation, Orientation, Ping, Pose};

const FREQUENCY_HZ: f32 = 455_000.0;
const RANGE_METERS: f32 = 50.0;

fn channel(subsystem: u16, channel_id: u16, samples: &[u16]) -> ChannelData {
    ChannelData {
        channel: channel_id,
        subsystem,
        frequency_hz: FREQUENCY_HZ,
        range_meters: RANGE_METERS,
        range_delay: 0.0,
        samples: samples.to_vec(),
    }
}

fn pose(ping_number: u32) -> Pose {
    // A slow straight southbound track
    Pose {
        navigation: Navigation {
            latitude: 43.0 - ping_number as f64 * 1e-5,
            longitude: 16.0,
            course_deg: 180.0,
            heading_deg: 180.0,
            speed_mps: 1.5,
        },
        orientation: Orientation {
            roll_deg: 0.5,
            pitch_deg: -0.25,
            yaw_deg: 180.0,
            heave_m: 0.0,
        },
        fathometer: Fathometer {
            depth_m: 15.0,
            altitude_m: 9.0,
        },
    }
}

/// Build a tagged-format log: one reference-time record, then per ping a
/// ping record (pose inline) followed by port and starboard channel data.
pub fn tagged_log(epoch_ms: u64, subsystem: u16, pings: &[(u64, [Vec<u16>; 2])]) -> Vec<u8> {
    let mut out = tagged::encode_reference_time(0, epoch_ms);
    for (number, (ts, sides)) in pings.iter().enumerate() {
        let ping = Ping {
            ping_number: number as u32,
            subsystem,
            frequency_hz: FREQUENCY_HZ,
            range_meters: RANGE_METERS,
            pose: pose(number as u32),
        };
        out.extend(tagged::encode_ping(*ts, &ping));
        out.extend(tagged::encode_channel(*ts, &channel(subsystem, 0, &sides[0])));
        out.extend(tagged::encode_channel(*ts, &channel(subsystem, 1, &sides[1])));
    }
    out
}

/// Build a framed-format log: one reference-time record, then per ping a
/// navigation, orientation and fathometer record followed by port and
/// starboard channel data.
pub fn framed_log(epoch_ms: u64, subsystem: u8, pings: &[(u32, [Vec<u16>; 2])]) -> Vec<u8> {
    let mut out = framed::encode_reference_time(0, epoch_ms);
    for (number, (ts, sides)) in pings.iter().enumerate() {
        let pose = pose(number as u32);
        out.extend(framed::encode_navigation(*ts, &pose.navigation));
        out.extend(framed::encode_orientation(*ts, &pose.orientation));
        out.extend(framed::encode_fathometer(*ts, &pose.fathometer));
        out.extend(framed::encode_channel(
            *ts,
            &channel(subsystem as u16, 0, &sides[0]),
        ));
        out.extend(framed::encode_channel(
            *ts,
            &channel(subsystem as u16, 1, &sides[1]),
        ));
    }
    out
}

/// Regular ping train with ramp-shaped sample data, for the CLI.
pub fn demo_pings_u64(count: u32, period_ms: u64, samples_per_side: usize) -> Vec<(u64, [Vec<u16>; 2])> {
    (0..count)
        .map(|i| {
            let ramp: Vec<u16> = (0..samples_per_side)
                .map(|j| ((j * 64 + i as usize * 7) % 65_536) as u16)
                .collect();
            (i as u64 * period_ms, [ramp.clone(), ramp])
        })
        .collect()
}

/// Same ping train with 32-bit relative timestamps, for the framed format.
pub fn demo_pings_u32(count: u32, period_ms: u32, samples_per_side: usize) -> Vec<(u32, [Vec<u16>; 2])> {
    demo_pings_u64(count, period_ms as u64, samples_per_side)
        .into_iter()
        .map(|(ts, sides)| (ts as u32, sides))
        .collect()
}
