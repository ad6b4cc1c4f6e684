//! Векторные ядра для матричных операций
//!
//! Данные обрабатываются группами по 4 double (один 256-битный регистр AVX),
//! остаток меньше группы считается скалярно. Если AVX/FMA недоступны,
//! используются скалярные версии с тем же порядком вычислений,
//! поэтому результат совпадает побитово.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
use std::sync::OnceLock;

/// Число double в одной векторной группе
pub const GROUP_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy)]
struct SimdCaps {
    avx: bool,
    fma: bool,
}

static SIMD_CAPS: OnceLock<SimdCaps> = OnceLock::new();

#[cfg(target_arch = "x86_64")]
fn detect_caps() -> SimdCaps {
    let avx = is_x86_feature_detected!("avx");
    SimdCaps {
        avx,
        fma: avx && is_x86_feature_detected!("fma"),
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect_caps() -> SimdCaps {
    SimdCaps { avx: false, fma: false }
}

fn simd_caps() -> SimdCaps {
    *SIMD_CAPS.get_or_init(detect_caps)
}

/// Есть ли аппаратная поддержка векторных ядер
pub fn simd_available() -> bool {
    simd_caps().fma
}

/// Заполняет `dst` значением `value`
pub fn fill(dst: &mut [f64], value: f64) {
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().avx {
            unsafe { fill_avx(dst, value) };
            return;
        }
    }
    scalar::fill(dst, value)
}

/// dst[i] = a[i] + b[i]
pub fn add(dst: &mut [f64], a: &[f64], b: &[f64]) {
    let n = dst.len();
    let (a, b) = (&a[..n], &b[..n]);
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().avx {
            unsafe { add_avx(dst, a, b) };
            return;
        }
    }
    scalar::add(dst, a, b)
}

/// dst[i] = a[i] - b[i]
pub fn sub(dst: &mut [f64], a: &[f64], b: &[f64]) {
    let n = dst.len();
    let (a, b) = (&a[..n], &b[..n]);
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().avx {
            unsafe { sub_avx(dst, a, b) };
            return;
        }
    }
    scalar::sub(dst, a, b)
}

/// dst[i] = -a[i]
pub fn neg(dst: &mut [f64], a: &[f64]) {
    let a = &a[..dst.len()];
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().avx {
            unsafe { neg_avx(dst, a) };
            return;
        }
    }
    scalar::neg(dst, a)
}

/// dst[i] = |a[i]|
pub fn abs(dst: &mut [f64], a: &[f64]) {
    let a = &a[..dst.len()];
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().avx {
            unsafe { abs_avx(dst, a) };
            return;
        }
    }
    scalar::abs(dst, a)
}

/// Скалярное произведение с накоплением по 4 полосам через fused multiply-add
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    #[cfg(target_arch = "x86_64")]
    {
        if simd_caps().fma {
            return unsafe { dot_fma(a, b) };
        }
    }
    scalar::dot(a, b)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn fill_avx(dst: &mut [f64], value: f64) {
    let n = dst.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let value_vec = _mm256_set1_pd(value);
    let out = dst.as_mut_ptr();
    let mut i = 0;
    while i < cap {
        _mm256_storeu_pd(out.add(i), value_vec);
        i += GROUP_WIDTH;
    }
    for x in &mut dst[cap..] {
        *x = value;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn add_avx(dst: &mut [f64], a: &[f64], b: &[f64]) {
    let n = dst.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let (out, pa, pb) = (dst.as_mut_ptr(), a.as_ptr(), b.as_ptr());
    let mut i = 0;
    while i < cap {
        let sum = _mm256_add_pd(_mm256_loadu_pd(pa.add(i)), _mm256_loadu_pd(pb.add(i)));
        _mm256_storeu_pd(out.add(i), sum);
        i += GROUP_WIDTH;
    }
    for idx in cap..n {
        dst[idx] = a[idx] + b[idx];
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn sub_avx(dst: &mut [f64], a: &[f64], b: &[f64]) {
    let n = dst.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let (out, pa, pb) = (dst.as_mut_ptr(), a.as_ptr(), b.as_ptr());
    let mut i = 0;
    while i < cap {
        let diff = _mm256_sub_pd(_mm256_loadu_pd(pa.add(i)), _mm256_loadu_pd(pb.add(i)));
        _mm256_storeu_pd(out.add(i), diff);
        i += GROUP_WIDTH;
    }
    for idx in cap..n {
        dst[idx] = a[idx] - b[idx];
    }
}

// Знак переключается XOR со знаковым битом, как и у скалярного `-x`
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn neg_avx(dst: &mut [f64], a: &[f64]) {
    let n = dst.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let sign = _mm256_set1_pd(-0.0);
    let (out, pa) = (dst.as_mut_ptr(), a.as_ptr());
    let mut i = 0;
    while i < cap {
        _mm256_storeu_pd(out.add(i), _mm256_xor_pd(_mm256_loadu_pd(pa.add(i)), sign));
        i += GROUP_WIDTH;
    }
    for idx in cap..n {
        dst[idx] = -a[idx];
    }
}

// Сброс знакового бита, совпадает с f64::abs в том числе для -0.0 и NaN
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
unsafe fn abs_avx(dst: &mut [f64], a: &[f64]) {
    let n = dst.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let sign = _mm256_set1_pd(-0.0);
    let (out, pa) = (dst.as_mut_ptr(), a.as_ptr());
    let mut i = 0;
    while i < cap {
        _mm256_storeu_pd(out.add(i), _mm256_andnot_pd(sign, _mm256_loadu_pd(pa.add(i))));
        i += GROUP_WIDTH;
    }
    for idx in cap..n {
        dst[idx] = a[idx].abs();
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx,fma")]
unsafe fn dot_fma(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    let cap = n / GROUP_WIDTH * GROUP_WIDTH;
    let (pa, pb) = (a.as_ptr(), b.as_ptr());
    let mut acc = _mm256_setzero_pd();
    let mut k = 0;
    while k < cap {
        acc = _mm256_fmadd_pd(_mm256_loadu_pd(pa.add(k)), _mm256_loadu_pd(pb.add(k)), acc);
        k += GROUP_WIDTH;
    }
    let mut lanes = [0.0f64; GROUP_WIDTH];
    _mm256_storeu_pd(lanes.as_mut_ptr(), acc);
    let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];
    for k in cap..n {
        sum += a[k] * b[k];
    }
    sum
}

/// Скалярные версии ядер, повторяющие порядок вычислений векторных
pub mod scalar {
    use super::GROUP_WIDTH;

    pub fn fill(dst: &mut [f64], value: f64) {
        dst.fill(value);
    }

    pub fn add(dst: &mut [f64], a: &[f64], b: &[f64]) {
        for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
            *d = x + y;
        }
    }

    pub fn sub(dst: &mut [f64], a: &[f64], b: &[f64]) {
        for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
            *d = x - y;
        }
    }

    pub fn neg(dst: &mut [f64], a: &[f64]) {
        for (d, &x) in dst.iter_mut().zip(a) {
            *d = -x;
        }
    }

    pub fn abs(dst: &mut [f64], a: &[f64]) {
        for (d, &x) in dst.iter_mut().zip(a) {
            *d = x.abs();
        }
    }

    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len());
        let cap = n / GROUP_WIDTH * GROUP_WIDTH;
        let mut lanes = [0.0f64; GROUP_WIDTH];
        for (ga, gb) in a[..cap].chunks_exact(GROUP_WIDTH).zip(b[..cap].chunks_exact(GROUP_WIDTH)) {
            for lane in 0..GROUP_WIDTH {
                lanes[lane] = ga[lane].mul_add(gb[lane], lanes[lane]);
            }
        }
        let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];
        for k in cap..n {
            sum += a[k] * b[k];
        }
        sum
    }
}
