use super::{signed_delta, Direction, JoystickSettings, Output, Rotation};

/// Two-key span anchored at a cardinal and extending toward its neighbour in
/// a fixed rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub anchor: Direction,
    pub rotation: Rotation,
    /// The anchor has been dropped and only the neighbour is held
    pub dropped: bool,
}

impl Segment {
    pub fn next(&self) -> Direction {
        self.anchor.adjacent(self.rotation)
    }
}

/// Hold mode state machine. Holds the nearest cardinal, adds its neighbour
/// past the add threshold, drops the anchor past the drop threshold and
/// re-anchors once the stick is far enough past the neighbour.
#[derive(Debug, Default)]
pub struct HoldTracker {
    segment: Option<Segment>,
}

impl HoldTracker {
    pub fn reset(&mut self) {
        self.segment = None;
    }

    pub fn segment(&self) -> Option<Segment> {
        self.segment
    }

    pub fn update(&mut self, angle: f64, x: f64, y: f64, settings: &JoystickSettings) -> Output {
        let add = settings.hold.angle_fraction * 90.0;
        let drop = 90.0 - add;
        let abandon = add * settings.hold.hysteresis;

        // A single sample can move the stick past more than one cardinal
        for _ in 0..4 {
            let Some(segment) = self.segment else {
                break;
            };
            let travel = segment.rotation.sign() * signed_delta(angle, segment.anchor.angle());
            if travel < abandon {
                log::trace!("Abandoning segment at {angle:.1}: {segment:?}");
                self.segment = None;
                break;
            }

            let next = segment.next();
            if travel - 90.0 >= add {
                log::trace!("Re-anchoring segment from {:?} to {next:?}", segment.anchor);
                self.segment = Some(Segment {
                    anchor: next,
                    rotation: segment.rotation,
                    dropped: false,
                });
                continue;
            }

            if travel >= drop {
                self.segment = Some(Segment {
                    dropped: true,
                    ..segment
                });
                return Output::single(next);
            }
            self.segment = Some(Segment {
                dropped: false,
                ..segment
            });
            return Output::pair(segment.anchor, next, 1.0);
        }

        let nearest = Direction::nearest(angle);
        let offset = signed_delta(angle, nearest.angle());
        if offset == 0.0 || !self.should_start(offset, x, y, add, settings) {
            self.segment = None;
            return Output::single(nearest);
        }

        let segment = Segment {
            anchor: nearest,
            rotation: Rotation::toward(offset),
            dropped: false,
        };
        log::trace!("Starting segment at {angle:.1}: {segment:?}");
        self.segment = Some(segment);
        Output::pair(nearest, segment.next(), 1.0)
    }

    fn should_start(
        &self,
        offset: f64,
        x: f64,
        y: f64,
        add: f64,
        settings: &JoystickSettings,
    ) -> bool {
        if offset.abs() >= add {
            return true;
        }
        let Some(assist) = settings.diagonal_assist.as_ref() else {
            return false;
        };
        offset.abs() > assist.min_angle || settings.both_axes_engaged(x, y)
    }
}
