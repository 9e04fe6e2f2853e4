//! 贝塞尔曲线插值

/// 插值字节的满量程
pub const CURVE_MAX: f64 = 127.0;

/// 贝塞尔曲线（用于 VMD 动画插值）
///
/// 控制点保存为原始字节值（0..=127 为有效区间）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BezierCurve {
    pub x1: u8,
    pub y1: u8,
    pub x2: u8,
    pub y2: u8,
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::linear()
    }
}

impl BezierCurve {
    pub const fn new(x1: u8, y1: u8, x2: u8, y2: u8) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 线性插值（MMD 默认曲线）
    pub const fn linear() -> Self {
        Self::new(20, 20, 107, 107)
    }

    /// 从 VMD 插值数据创建
    pub fn from_vmd_data(data: &[u8; 4]) -> Self {
        Self::new(data[0], data[1], data[2], data[3])
    }

    /// 两个控制点都在对角线上时退化为线性
    pub fn is_linear(&self) -> bool {
        self.x1 == self.y1 && self.x2 == self.y2
    }

    /// 对比例 `x ∈ [0, 1]` 求曲线上的 y
    pub fn evaluate(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        if self.is_linear() {
            return x;
        }

        let x = x as f64;
        let x1 = self.x1 as f64 / CURVE_MAX;
        let y1 = self.y1 as f64 / CURVE_MAX;
        let x2 = self.x2 as f64 / CURVE_MAX;
        let y2 = self.y2 as f64 / CURVE_MAX;

        let t = solve_t(x1, x2, x);
        let s = 1.0 - t;
        (3.0 * s * s * t * y1 + 3.0 * s * t * t * y2 + t * t * t) as f32
    }

    /// 按帧号求插值比例
    ///
    /// `now - start` 或 `end - start` 为 0 时返回 0，到达或越过 `end` 时返回 1。
    pub fn evaluate_between(&self, start: f32, now: f32, end: f32) -> f32 {
        if now - start == 0.0 || end - start == 0.0 {
            return 0.0;
        }
        let x = (now - start) / (end - start);
        if x >= 1.0 {
            return 1.0;
        }
        self.evaluate(x)
    }
}

fn coefficients(p1: f64, p2: f64) -> (f64, f64, f64) {
    (3.0 * p1 - 3.0 * p2 + 1.0, -6.0 * p1 + 3.0 * p2, 3.0 * p1)
}

/// 求解 x(t) = x 的参数 t
///
/// 先用牛顿法，结果误差超过 1e-4 时退回二分法。
fn solve_t(x1: f64, x2: f64, x: f64) -> f64 {
    let (a, b, c) = coefficients(x1, x2);
    let value = |t: f64| ((a * t + b) * t + c) * t;
    let derivative = |t: f64| (3.0 * a * t + 2.0 * b) * t + c;

    let mut t = x;
    for _ in 0..20 {
        let mut d = derivative(t);
        if d.abs() < 1e-15 {
            d = 1.0;
        }
        let next = (t - (value(t) - x) / d).clamp(0.0, 1.0);
        let delta = (next - t).abs();
        t = next;
        if delta <= 1e-20 {
            break;
        }
    }

    if (value(t) - x).abs() <= 1e-4 {
        return t;
    }

    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if value(mid) < x {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-9 {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_endpoints() {
        let curve = BezierCurve::new(64, 0, 64, 127);
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert_eq!(curve.evaluate(1.0), 1.0);
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let curve = BezierCurve::new(64, 0, 63, 127);
        assert_abs_diff_eq!(curve.evaluate(0.5), 0.5, epsilon = 0.01);
        assert!(curve.evaluate(0.2) < 0.2);
        assert!(curve.evaluate(0.8) > 0.8);
    }

    #[test]
    fn test_evaluate_between_degenerate_span() {
        let curve = BezierCurve::linear();
        assert_eq!(curve.evaluate_between(10.0, 10.0, 20.0), 0.0);
        assert_eq!(curve.evaluate_between(10.0, 15.0, 10.0), 0.0);
        assert_eq!(curve.evaluate_between(10.0, 25.0, 20.0), 1.0);
        assert_eq!(curve.evaluate_between(10.0, 15.0, 20.0), 0.5);
    }

    #[test]
    fn test_steep_curve_converges() {
        let curve = BezierCurve::new(127, 0, 127, 0);
        let y = curve.evaluate(0.999);
        assert!(y.is_finite());
        assert!((0.0..=1.0).contains(&y));
    }

    proptest! {
        #[test]
        fn prop_diagonal_curve_is_identity(a in 0u8..=127, b in 0u8..=127, r in 0.0f32..=1.0) {
            let curve = BezierCurve::new(a, a, b, b);
            prop_assert_eq!(curve.evaluate(r), r);
        }

        #[test]
        fn prop_result_stays_in_unit_range(
            x1 in 0u8..=127, y1 in 0u8..=127, x2 in 0u8..=127, y2 in 0u8..=127,
            r1 in 0.0f32..=1.0, r2 in 0.0f32..=1.0,
        ) {
            let curve = BezierCurve::new(x1, y1, x2, y2);
            let (lo, hi) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
            let ylo = curve.evaluate(lo);
            let yhi = curve.evaluate(hi);
            prop_assert!((-1e-4..=1.0 + 1e-4).contains(&ylo));
            prop_assert!((-1e-4..=1.0 + 1e-4).contains(&yhi));
        }
    }
}
