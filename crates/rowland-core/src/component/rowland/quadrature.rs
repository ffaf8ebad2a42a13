//! Fixed-order Gauss-Legendre quadrature.

/// Non-negative abscissae of the 15-point Gauss-Legendre rule on [-1, 1].
/// The rule is symmetric; the last entry is the centre node.
const NODES: [f64; 8] = [
    0.987_992_518_020_485_4,
    0.937_273_392_400_706,
    0.848_206_583_410_427_2,
    0.724_417_731_360_170_1,
    0.570_972_172_608_538_8,
    0.394_151_347_077_563_4,
    0.201_194_093_997_434_5,
    0.0,
];

/// Weights matching [`NODES`].
const WEIGHTS: [f64; 8] = [
    0.030_753_241_996_117_495,
    0.070_366_047_488_108_14,
    0.107_159_220_467_172_04,
    0.139_570_677_926_154_27,
    0.166_269_205_816_993_98,
    0.186_161_000_015_562_1,
    0.198_431_485_327_111_58,
    0.202_578_241_925_561_3,
];

/// Integrate `f` over `[-half_width, half_width]` with the 15-point rule.
pub fn gauss_legendre_15<F: Fn(f64) -> f64>(f: F, half_width: f64) -> f64 {
    let mut sum = WEIGHTS[7] * f(0.0);
    for (x, w) in NODES[..7].iter().zip(&WEIGHTS[..7]) {
        let t = half_width * x;
        sum += w * (f(t) + f(-t));
    }
    half_width * sum
}
