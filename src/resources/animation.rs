use std::sync::atomic::{AtomicU32, Ordering};

use cgmath::{InnerSpace, VectorSpace};

use crate::data_structures::{bounding::Aabb, instance::Instance};

static NEXT_ANIMATION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<cgmath::Vector3<f32>>),
    Rotation(Vec<cgmath::Quaternion<f32>>),
    Scale(Vec<cgmath::Vector3<f32>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u32);

/// A skeletal animation binding as far as the batching core is concerned: the
/// root pose over time and the bounds of the skinned geometry. Bone palettes
/// live with the skinning renderer.
#[derive(Clone, Debug)]
pub struct Animation {
    id: AnimationId,
    pub name: String,
    pub frames: Vec<Instance>,
    pub timestamps: Vec<f32>,
    pub bounds: Aabb,
}

impl Animation {
    pub fn new(name: &str, frames: Vec<Instance>, timestamps: Vec<f32>, bounds: Aabb) -> Self {
        Self {
            id: AnimationId(NEXT_ANIMATION_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            frames,
            timestamps,
            bounds,
        }
    }

    /**
     * Merges separate translation/rotation/scale tracks into one pose per frame.
     *
     * Tracks shorter than the longest one are padded with their first frame
     * (this is important as child nodes have offsets). The longest timestamp
     * list wins.
     */
    pub fn from_keyframes(name: &str, tracks: Vec<(Keyframes, Vec<f32>)>, bounds: Aabb) -> Self {
        let mut trans = Vec::new();
        let mut rots = Vec::new();
        let mut scals = Vec::new();
        let mut timestamps: Vec<f32> = Vec::new();
        for (keyframes, times) in tracks {
            match keyframes {
                Keyframes::Translation(mut t) => trans.append(&mut t),
                Keyframes::Rotation(mut r) => rots.append(&mut r),
                Keyframes::Scale(mut s) => scals.append(&mut s),
            }
            if times.len() > timestamps.len() {
                timestamps = times;
            }
        }
        let max_len = trans.len().max(rots.len().max(scals.len()));
        if trans.len() != rots.len() || rots.len() != scals.len() {
            log::warn!(
                "animation track len() doesn't match in {} and will be matched with defaults",
                name
            );
        }
        let identity = Instance::new();
        let pad_t = trans.first().copied().unwrap_or(identity.position);
        let pad_r = rots.first().copied().unwrap_or(identity.rotation);
        let pad_s = scals.first().copied().unwrap_or(identity.scale);
        let frames = (0..max_len)
            .map(|i| Instance {
                position: trans.get(i).copied().unwrap_or(pad_t),
                rotation: rots.get(i).copied().unwrap_or(pad_r),
                scale: scals.get(i).copied().unwrap_or(pad_s),
            })
            .collect();
        Self::new(name, frames, timestamps, bounds)
    }

    pub fn id(&self) -> AnimationId {
        self.id
    }

    /// Number of frames that have a timestamp. Extra frames or stamps are ignored.
    fn keyed_len(&self) -> usize {
        self.frames.len().min(self.timestamps.len())
    }

    /// Timestamp of the last keyed frame.
    pub fn duration(&self) -> f32 {
        self.timestamps[..self.keyed_len()]
            .last()
            .copied()
            .unwrap_or(0.0)
    }

    /// Pose at `time` seconds, looping over the clip and interpolating between keyframes.
    pub fn sample(&self, time: f32) -> Instance {
        let Some(first) = self.frames.first().copied() else {
            return Instance::new();
        };
        let len = self.keyed_len();
        let duration = self.duration();
        if len < 2 || duration <= 0.0 {
            return first;
        }
        let t = time.rem_euclid(duration);
        let stamps = &self.timestamps[..len];
        let Some(next) = stamps.iter().position(|&stamp| stamp > t) else {
            return self.frames[len - 1];
        };
        if next == 0 {
            return first;
        }
        let prev = next - 1;
        let span = stamps[next] - stamps[prev];
        let factor = if span > 0.0 {
            ((t - stamps[prev]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (a, b) = (&self.frames[prev], &self.frames[next]);
        Instance {
            position: a.position.lerp(b.position, factor),
            rotation: a.rotation.nlerp(b.rotation, factor).normalize(),
            scale: a.scale.lerp(b.scale, factor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::Vector3;

    fn at_height(y: f32) -> Instance {
        Instance {
            position: Vector3::new(0.0, y, 0.0),
            ..Instance::new()
        }
    }

    fn unit_bounds() -> Aabb {
        Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))
    }

    fn rising(timestamps: Vec<f32>) -> Animation {
        Animation::new("rise", vec![at_height(0.0), at_height(10.0)], timestamps, unit_bounds())
    }

    #[test]
    fn samples_between_keyframes() {
        let clip = rising(vec![0.0, 1.0]);
        assert_relative_eq!(clip.sample(0.0).position.y, 0.0);
        assert_relative_eq!(clip.sample(0.5).position.y, 5.0);
        assert_relative_eq!(clip.sample(0.9).position.y, 9.0, epsilon = 1e-5);
    }

    #[test]
    fn time_wraps_around_the_clip() {
        let clip = rising(vec![0.0, 1.0]);
        assert_relative_eq!(clip.sample(1.25).position.y, 2.5, epsilon = 1e-5);
        assert_relative_eq!(clip.sample(-0.25).position.y, 7.5, epsilon = 1e-5);
    }

    #[test]
    fn extra_timestamps_never_extrapolate() {
        let clip = rising(vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(clip.duration(), 1.0);
        for step in 0..40 {
            let y = clip.sample(step as f32 * 0.1).position.y;
            assert!((0.0..=10.0).contains(&y), "sampled {y}");
        }
    }

    #[test]
    fn extra_frames_are_ignored() {
        let frames = vec![at_height(0.0), at_height(10.0), at_height(100.0)];
        let clip = Animation::new("rise", frames, vec![0.0, 2.0], unit_bounds());
        assert_eq!(clip.duration(), 2.0);
        assert_relative_eq!(clip.sample(1.0).position.y, 5.0);
    }

    #[test]
    fn degenerate_clips_hold_their_first_pose() {
        let single = Animation::new("still", vec![at_height(4.0)], vec![0.0], unit_bounds());
        assert_eq!(single.sample(3.0), at_height(4.0));

        let unkeyed = Animation::new("unkeyed", vec![at_height(4.0)], Vec::new(), unit_bounds());
        assert_eq!(unkeyed.sample(1.0), at_height(4.0));

        let empty = Animation::new("empty", Vec::new(), vec![0.0, 1.0], unit_bounds());
        assert_eq!(empty.sample(0.5), Instance::new());
    }

    #[test]
    fn short_tracks_are_padded_with_their_first_key() {
        let clip = Animation::from_keyframes(
            "walk",
            vec![
                (
                    Keyframes::Translation(vec![
                        Vector3::new(0.0, 0.0, 0.0),
                        Vector3::new(2.0, 0.0, 0.0),
                    ]),
                    vec![0.0, 1.0],
                ),
                (Keyframes::Scale(vec![Vector3::new(2.0, 2.0, 2.0)]), vec![0.0]),
            ],
            unit_bounds(),
        );
        assert_eq!(clip.frames.len(), 2);
        assert_eq!(clip.timestamps, vec![0.0, 1.0]);
        assert_eq!(clip.frames[1].scale, Vector3::new(2.0, 2.0, 2.0));
        assert_eq!(clip.frames[1].rotation, Instance::new().rotation);
        assert_relative_eq!(clip.sample(0.5).position.x, 1.0);
    }
}
