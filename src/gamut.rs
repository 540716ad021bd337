//! Gamut clipping onto the palette hull
//!
//! Error diffusion adds the neighbours' error to every pixel. On saturated
//! images the adjusted color can leave the volume the pigments span, and the
//! error then piles up in a direction no pigment can ever pay back. A
//! [`Gamut`] projects such colors onto the nearest point of the palette's
//! solid before the nearest-color search:
//!
//! - 1 entry: the point itself
//! - 2 entries: the segment between them (black and white)
//! - 6 entries: an octahedron with the darkest and lightest entries as poles
//!   and the four others around the gray axis (Spectra 6)
//!
//! Projections work on barycentric weights over the palette vertices, in
//! `f32`.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::color::MONOCHROME;
//! use reterminal_e100x::gamut::Gamut;
//!
//! if let Some(gamut) = Gamut::for_palette(&MONOCHROME) {
//!     // Pure red lands on the gray of equal brightness
//!     assert_eq!(gamut.clip([255, 0, 0]), [85, 85, 85]);
//! }
//! ```

use crate::color::{Palette, rgb_channels};

/// RGB point with channels on the 0..=255 scale
pub type Vec3 = [f32; 3];

/// Slack for points on a shared wedge face
const INSIDE_EPSILON: f32 = -1e-4;

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn scale(a: Vec3, k: f32) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

fn distance_squared(a: Vec3, b: Vec3) -> f32 {
    let d = sub(a, b);
    dot(d, d)
}

/// `n / d`, or 0 for a degenerate denominator
fn ratio(n: f32, d: f32) -> f32 {
    if d == 0.0 { 0.0 } else { n / d }
}

fn combine<const N: usize>(vertices: &[Vec3; N], weights: &[f32; N]) -> Vec3 {
    let mut point = [0.0; 3];
    for (v, &w) in vertices.iter().zip(weights) {
        for c in 0..3 {
            point[c] += v[c] * w;
        }
    }
    point
}

/// Segment between two colors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineProjector {
    origin: Vec3,
    direction: Vec3,
    norm_squared: f32,
}

impl LineProjector {
    /// Segment from `a` to `b`
    pub fn new([a, b]: [Vec3; 2]) -> Self {
        let direction = sub(b, a);
        Self {
            origin: a,
            direction,
            norm_squared: dot(direction, direction),
        }
    }

    /// Barycentric weights of the projection onto the infinite line
    ///
    /// A zero-length segment projects everything onto its origin.
    pub fn project(&self, point: Vec3) -> [f32; 2] {
        if self.norm_squared == 0.0 {
            return [1.0, 0.0];
        }
        let t = dot(sub(point, self.origin), self.direction) / self.norm_squared;
        [1.0 - t, t]
    }

    /// Projection clipped to the segment, and whether it was clipped
    pub fn clipping_project(&self, point: Vec3) -> ([f32; 2], bool) {
        let weights = self.project(point);
        if weights[0] < 0.0 {
            ([0.0, 1.0], true)
        } else if weights[1] < 0.0 {
            ([1.0, 0.0], true)
        } else {
            (weights, false)
        }
    }

    /// Point for barycentric weights
    pub fn point(&self, weights: [f32; 2]) -> Vec3 {
        let step = scale(self.direction, weights[1]);
        [
            self.origin[0] + step[0],
            self.origin[1] + step[1],
            self.origin[2] + step[2],
        ]
    }
}

/// Triangle between three colors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleProjector {
    vertices: [Vec3; 3],
}

impl TriangleProjector {
    /// Triangle over `vertices`
    pub fn new(vertices: [Vec3; 3]) -> Self {
        Self { vertices }
    }

    /// Barycentric weights of the closest point on the triangle
    ///
    /// Walks the vertex, edge and face regions in turn, so the result is
    /// always inside the triangle.
    pub fn closest(&self, p: Vec3) -> [f32; 3] {
        let [a, b, c] = self.vertices;
        let ab = sub(b, a);
        let ac = sub(c, a);

        let ap = sub(p, a);
        let d1 = dot(ab, ap);
        let d2 = dot(ac, ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return [1.0, 0.0, 0.0];
        }

        let bp = sub(p, b);
        let d3 = dot(ab, bp);
        let d4 = dot(ac, bp);
        if d3 >= 0.0 && d4 <= d3 {
            return [0.0, 1.0, 0.0];
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = ratio(d1, d1 - d3);
            return [1.0 - v, v, 0.0];
        }

        let cp = sub(p, c);
        let d5 = dot(ab, cp);
        let d6 = dot(ac, cp);
        if d6 >= 0.0 && d5 <= d6 {
            return [0.0, 0.0, 1.0];
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = ratio(d2, d2 - d6);
            return [1.0 - w, 0.0, w];
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
            let w = ratio(d4 - d3, (d4 - d3) + (d5 - d6));
            return [0.0, 1.0 - w, w];
        }

        let total = va + vb + vc;
        let v = ratio(vb, total);
        let w = ratio(vc, total);
        [1.0 - v - w, v, w]
    }

    /// Point for barycentric weights
    pub fn point(&self, weights: [f32; 3]) -> Vec3 {
        combine(&self.vertices, &weights)
    }
}

/// Tetrahedron between four colors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TetrahedronProjector {
    origin: Vec3,
    edges: [Vec3; 3],
    volume: f32,
}

impl TetrahedronProjector {
    /// Tetrahedron over `vertices`
    pub fn new([a, b, c, d]: [Vec3; 4]) -> Self {
        let edges = [sub(b, a), sub(c, a), sub(d, a)];
        let volume = dot(edges[0], cross(edges[1], edges[2]));
        Self {
            origin: a,
            edges,
            volume,
        }
    }

    /// Barycentric weights of `p`; negative weights mean `p` is outside
    ///
    /// Returns `None` for a flat tetrahedron.
    pub fn project(&self, p: Vec3) -> Option<[f32; 4]> {
        if self.volume == 0.0 {
            return None;
        }
        let [e1, e2, e3] = self.edges;
        let ap = sub(p, self.origin);
        let l1 = dot(ap, cross(e2, e3)) / self.volume;
        let l2 = dot(e1, cross(ap, e3)) / self.volume;
        let l3 = dot(e1, cross(e2, ap)) / self.volume;
        Some([1.0 - l1 - l2 - l3, l1, l2, l3])
    }
}

/// Octahedron of two poles and four equatorial colors
///
/// Vertex order is north, south, then the equator in cyclic order. The solid
/// is the union of the four wedges `north, south, e[i], e[i+1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OctahedronProjector {
    vertices: [Vec3; 6],
    wedges: [TetrahedronProjector; 4],
    faces: [TriangleProjector; 8],
}

impl OctahedronProjector {
    /// Octahedron over `vertices`
    pub fn new(vertices: [Vec3; 6]) -> Self {
        let equator = |i: usize| vertices[2 + i % 4];
        let wedges = core::array::from_fn(|i| {
            TetrahedronProjector::new([vertices[0], vertices[1], equator(i), equator(i + 1)])
        });
        // First four faces touch north, the rest south
        let faces = core::array::from_fn(|i| {
            TriangleProjector::new([vertices[i / 4], equator(i), equator(i + 1)])
        });
        Self {
            vertices,
            wedges,
            faces,
        }
    }

    /// Barycentric weights over the six vertices of the closest point in
    /// the solid
    pub fn project(&self, p: Vec3) -> [f32; 6] {
        for (i, wedge) in self.wedges.iter().enumerate() {
            let Some(local) = wedge.project(p) else {
                continue;
            };
            if local.iter().all(|&w| w >= INSIDE_EPSILON) {
                let mut global = [0.0; 6];
                global[0] = local[0];
                global[1] = local[1];
                global[2 + i % 4] = local[2];
                global[2 + (i + 1) % 4] = local[3];
                return normalized(global);
            }
        }

        let mut best = ([0.0; 6], f32::INFINITY);
        for (i, face) in self.faces.iter().enumerate() {
            let local = face.closest(p);
            let distance = distance_squared(face.point(local), p);
            if distance < best.1 {
                let mut global = [0.0; 6];
                global[i / 4] = local[0];
                global[2 + i % 4] = local[1];
                global[2 + (i + 1) % 4] = local[2];
                best = (global, distance);
            }
        }
        best.0
    }

    /// Point for barycentric weights
    pub fn point(&self, weights: [f32; 6]) -> Vec3 {
        combine(&self.vertices, &weights)
    }
}

/// Drop rounding noise below zero and rescale to a sum of 1
fn normalized<const N: usize>(mut weights: [f32; N]) -> [f32; N] {
    for w in &mut weights {
        if *w < 0.0 {
            *w = 0.0;
        }
    }
    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        for w in &mut weights {
            *w /= sum;
        }
    }
    weights
}

/// Solid spanned by a palette
#[derive(Clone, Debug, PartialEq)]
pub enum Gamut {
    /// Single color
    Point(Vec3),
    /// Two colors
    Segment(LineProjector),
    /// Six colors
    Octahedron(OctahedronProjector),
}

impl Gamut {
    /// Gamut for a palette of 1, 2 or 6 entries
    ///
    /// Other palette sizes have no supported solid and return `None`.
    pub fn for_palette(palette: &Palette<'_>) -> Option<Self> {
        let mut vertices = [[0.0f32; 3]; 6];
        let entries = palette.entries();
        for (vertex, entry) in vertices.iter_mut().zip(entries) {
            let channels = rgb_channels(entry.rgb);
            *vertex = [channels[0] as f32, channels[1] as f32, channels[2] as f32];
        }
        match entries.len() {
            1 => Some(Self::Point(vertices[0])),
            2 => Some(Self::Segment(LineProjector::new([vertices[0], vertices[1]]))),
            6 => Some(Self::Octahedron(OctahedronProjector::new(octahedron_order(
                vertices,
            )))),
            _ => None,
        }
    }

    /// Closest color inside the gamut, rounded to whole channel values
    pub fn clip(&self, channels: [i32; 3]) -> [i32; 3] {
        let p = [channels[0] as f32, channels[1] as f32, channels[2] as f32];
        let q = match self {
            Self::Point(v) => *v,
            Self::Segment(line) => line.point(line.clipping_project(p).0),
            Self::Octahedron(octahedron) => octahedron.point(octahedron.project(p)),
        };
        q.map(|c| (c + 0.5).clamp(0.0, 255.0) as i32)
    }
}

/// Put the darkest and lightest colors first, then the rest in cyclic order
/// around the axis between them
fn octahedron_order(vertices: [Vec3; 6]) -> [Vec3; 6] {
    let brightness = |v: &Vec3| v[0] + v[1] + v[2];
    let by_brightness =
        |a: &usize, b: &usize| brightness(&vertices[*a]).total_cmp(&brightness(&vertices[*b]));

    let mut order = [0usize, 1, 2, 3, 4, 5];
    order.sort_by(by_brightness);
    let north = order[0];
    let south = order[5];
    let mut equator = [order[1], order[2], order[3], order[4]];

    let axis = sub(vertices[south], vertices[north]);
    let axis_norm = dot(axis, axis);
    let off_axis = |v: Vec3| {
        let r = sub(v, vertices[north]);
        sub(r, scale(axis, ratio(dot(r, axis), axis_norm)))
    };
    let e1 = off_axis(vertices[equator[0]]);
    let e2 = cross(axis, e1);
    let angle = |i: usize| {
        let r = off_axis(vertices[i]);
        pseudo_angle(dot(r, e1), dot(r, e2))
    };
    equator.sort_by(|a, b| angle(*a).total_cmp(&angle(*b)));

    [
        vertices[north],
        vertices[south],
        vertices[equator[0]],
        vertices[equator[1]],
        vertices[equator[2]],
        vertices[equator[3]],
    ]
}

/// Monotonic stand-in for `atan2(y, x)` in `[0, 4)`
fn pseudo_angle(x: f32, y: f32) -> f32 {
    let ax = if x < 0.0 { -x } else { x };
    let ay = if y < 0.0 { -y } else { y };
    let t = ratio(ay, ax + ay);
    match (x >= 0.0, y >= 0.0) {
        (true, true) => t,
        (false, true) => 2.0 - t,
        (false, false) => 2.0 + t,
        (true, false) => 4.0 - t,
    }
}
