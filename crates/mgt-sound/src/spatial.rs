// spatial.rs — listener state and the world geometry queries sound needs

use mgt_common::q_shared::{Vec3, VEC3_ORIGIN};

/// Where sound is heard from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Listener {
    pub origin: Vec3,
    /// Area the listener stands in. `None` means outside the world, which
    /// silences everything.
    pub area: Option<i32>,
    /// Emitters carrying this id belong to the listener.
    pub id: i32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            origin: VEC3_ORIGIN,
            area: Some(0),
            id: -1,
        }
    }
}

/// Apparent source of a sound heard through portals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortalPath {
    pub origin: Vec3,
    /// World units.
    pub distance: f32,
}

/// Area and portal queries answered by the renderer's world.
pub trait SpatialQuery: Send {
    fn point_in_area(&self, point: &Vec3) -> Option<i32>;

    /// Shortest route from `sound_area` to `listener_area` through open
    /// portals, no longer than `max_distance` world units. `None` when the
    /// listener cannot be reached.
    fn resolve_portal_path(
        &self,
        listener_area: i32,
        sound_area: i32,
        origin: &Vec3,
        max_distance: f32,
    ) -> Option<PortalPath>;
}
