//! Render targets, ping-pong pairs and the CPU field used by reference kernels.
//!
//! A [`PingPongPair`] holds two targets of the same shape. Passes read from one
//! side and write the other, then [`PingPongPair::swap`] flips the roles.
//! [`PingPongPair::split`] hands out the read side by shared reference and the
//! write side by exclusive reference at the same time, so a pass can never
//! sample the target it is rendering into.

use glam::{Vec2, Vec4};

use crate::textures::FilterMode;

/// Pixel format of a float render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelFormat {
    /// 4 x f32 per texel. Not filterable; read with integer texel loads.
    Rgba32Float,
    /// 4 x f16 per texel. Filterable and renderable everywhere.
    Rgba16Float,
}

impl From<TexelFormat> for wgpu::TextureFormat {
    fn from(format: TexelFormat) -> Self {
        match format {
            TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Shape of a render target allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub filter: FilterMode,
}

impl TargetDescriptor {
    /// Describe a target. Zero dimensions are clamped to one texel.
    pub fn new(width: u32, height: u32, format: TexelFormat, filter: FilterMode) -> Self {
        if width == 0 || height == 0 {
            log::debug!("clamping {}x{} render target to at least 1x1", width, height);
        }
        Self {
            width: width.max(1),
            height: height.max(1),
            format,
            filter,
        }
    }

    /// Size of one texel in UV units.
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Which physical target of a pair is currently the read side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Side read on frame `frame`: even frames write `A`, odd frames write `B`.
    pub fn read_for_frame(frame: u64) -> Self {
        if frame % 2 == 0 {
            Side::B
        } else {
            Side::A
        }
    }
}

/// Two targets used alternately as source and destination.
#[derive(Debug, Clone)]
pub struct PingPongPair<T> {
    a: T,
    b: T,
    read: Side,
    swaps: u64,
}

impl<T> PingPongPair<T> {
    /// Create a pair reading from `a` and writing into `b`.
    pub fn new(a: T, b: T) -> Self {
        Self {
            a,
            b,
            read: Side::A,
            swaps: 0,
        }
    }

    /// The target passes sample from.
    pub fn read(&self) -> &T {
        match self.read {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    /// The target passes render into.
    pub fn write(&mut self) -> &mut T {
        match self.read {
            Side::A => &mut self.b,
            Side::B => &mut self.a,
        }
    }

    /// Read and write sides at once; the borrow checker keeps them distinct.
    pub fn split(&mut self) -> (&T, &mut T) {
        match self.read {
            Side::A => (&self.a, &mut self.b),
            Side::B => (&self.b, &mut self.a),
        }
    }

    /// Exchange the read and write roles. Call after every write.
    pub fn swap(&mut self) {
        self.read = match self.read {
            Side::A => Side::B,
            Side::B => Side::A,
        };
        self.swaps += 1;
    }

    /// Swap if needed so the read side matches `frame`'s parity. Returns
    /// `true` if a swap was needed, e.g. after the frame counter restarted.
    pub fn align_to_frame(&mut self, frame: u64) -> bool {
        if self.read == Side::read_for_frame(frame) {
            return false;
        }
        self.swap();
        true
    }

    /// Physical side currently being read.
    pub fn read_side(&self) -> Side {
        self.read
    }

    /// Number of swaps since construction or the last [`reset`](Self::reset).
    pub fn swap_count(&self) -> u64 {
        self.swaps
    }

    /// Make `A` the read side again.
    pub fn reset(&mut self) {
        self.read = Side::A;
        self.swaps = 0;
    }

    /// Mutable access to both physical targets, e.g. to clear them.
    pub fn both_mut(&mut self) -> (&mut T, &mut T) {
        (&mut self.a, &mut self.b)
    }
}

/// A CPU-side float texture with the sampling rules of the GPU fluid targets.
///
/// Texel `(x, y)` has its centre at `((x + 0.5) / w, (y + 0.5) / h)` in UV
/// space. Linear sampling clamps to the edge texel, matching a
/// clamp-to-edge sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl Field {
    /// A zero-filled field. Zero dimensions are clamped to one texel.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            texels: vec![Vec4::ZERO; width as usize * height as usize],
        }
    }

    /// A field allocated to match `desc`.
    pub fn from_descriptor(desc: &TargetDescriptor) -> Self {
        Self::new(desc.width, desc.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.texels[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let i = (y * self.width + x) as usize;
        self.texels[i] = value;
    }

    pub fn fill(&mut self, value: Vec4) {
        self.texels.fill(value);
    }

    /// UV of the centre of texel `(x, y)`.
    pub fn uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Bilinear sample at `uv` with clamp-to-edge addressing.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let px = uv.x * self.width as f32 - 0.5;
        let py = uv.y * self.height as f32 - 0.5;
        let x0 = px.floor();
        let y0 = py.floor();
        let tx = px - x0;
        let ty = py - y0;

        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let fetch = |x: f32, y: f32| {
            let xi = (x as i64).clamp(0, max_x) as u32;
            let yi = (y as i64).clamp(0, max_y) as u32;
            self.get(xi, yi)
        };

        let bottom = fetch(x0, y0).lerp(fetch(x0 + 1.0, y0), tx);
        let top = fetch(x0, y0 + 1.0).lerp(fetch(x0 + 1.0, y0 + 1.0), tx);
        bottom.lerp(top, ty)
    }

    /// Fill every texel by evaluating `kernel` at the texel's UV.
    ///
    /// This is the CPU equivalent of a full-screen fragment pass.
    pub fn render(&mut self, mut kernel: impl FnMut(Vec2) -> Vec4) {
        for y in 0..self.height {
            for x in 0..self.width {
                let uv = self.uv(x, y);
                self.set(x, y, kernel(uv));
            }
        }
    }

    /// Largest `xy` length over all texels.
    pub fn max_xy_magnitude(&self) -> f32 {
        self.texels
            .iter()
            .map(|t| t.truncate().truncate().length())
            .fold(0.0, f32::max)
    }

    /// Texel coordinates of the largest `xy` length.
    pub fn argmax_xy(&self) -> (u32, u32) {
        let (i, _) = self
            .texels
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, t)| {
                let m = t.truncate().truncate().length();
                if m > best.1 {
                    (i, m)
                } else {
                    best
                }
            });
        (i as u32 % self.width, i as u32 / self.width)
    }
}
