// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Ray directions traced from every probe.
//!
//! A spherical Fibonacci set, evenly spread over the sphere.  The set is not rotated between
//! frames; rotating it flickers under hysteresis blending.

use crate::buffer::{ArrayElement, BufferError, Mapped, StructuredBufferWriter};
use glam::Vec3;
use std::f32::consts::TAU;

pub fn ray_directions(count: u32) -> Vec<Vec3> {
    let golden_ratio = 5.0f32.sqrt() * 0.5 + 0.5;
    let n = count as f32;
    (0..count)
        .map(|i| {
            let i = i as f32;
            let phi = TAU * (i * (golden_ratio - 1.0)).fract();
            let cos_theta = 1.0 - (2.0 * i + 1.0) / n;
            let sin_theta = (1.0 - cos_theta * cos_theta).clamp(0.0, 1.0).sqrt();
            Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
        })
        .collect()
}

/// Writes `count` directions as vec3 array elements.
pub fn write_ray_directions<W: StructuredBufferWriter + ?Sized>(
    writer: &mut W,
    count: u32,
) -> Result<(), BufferError> {
    let mut mapped = Mapped::new(writer)?;
    for (i, direction) in ray_directions(count).into_iter().enumerate() {
        mapped.set_array_element(i, ArrayElement::Vec3(direction.to_array()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BlockLayout, ParameterBlock};

    #[test]
    fn directions_are_unit_and_balanced() {
        let directions = ray_directions(64);
        assert_eq!(directions.len(), 64);
        for direction in &directions {
            assert!((direction.length() - 1.0).abs() < 1e-5);
        }
        let sum: Vec3 = directions.iter().copied().sum();
        assert!(sum.length() < 0.5);
        //first ray points up, last one down
        assert!(directions[0].z > 0.9);
        assert!(directions[63].z < -0.9);
    }

    #[test]
    fn written_in_order() {
        let mut block = ParameterBlock::new(BlockLayout::Array { capacity: 16 });
        write_ray_directions(&mut block, 16).unwrap();
        let expected = ray_directions(16);
        assert_eq!(block.written_elements(), 16);
        let first = block.vec4_at(0);
        assert_eq!([first[0], first[1], first[2]], expected[0].to_array());
    }
}
