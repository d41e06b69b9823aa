//! 検証済みの容量

use crate::error::CapacityConfigError;
use crate::MAX_CAPACITY;

/// バッファ容量（0 ≤ N ≤ [`MAX_CAPACITY`]）
///
/// 0 は有効な値で、そのバッファは常に空のままになる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(usize);

impl Capacity {
    pub const ZERO: Self = Capacity(0);

    /// 容量を検証して生成する
    ///
    /// # エラー
    /// - [`MAX_CAPACITY`] を超える
    pub fn new(n: usize) -> Result<Self, CapacityConfigError> {
        if n > MAX_CAPACITY {
            return Err(CapacityConfigError::TooLarge {
                requested: n as u64,
                max: MAX_CAPACITY,
            });
        }
        Ok(Capacity(n))
    }

    /// 符号付き整数（JS の number 由来）から容量を生成する
    ///
    /// # エラー
    /// - 負の値
    /// - [`MAX_CAPACITY`] を超える
    pub fn from_signed(n: i64) -> Result<Self, CapacityConfigError> {
        if n < 0 {
            return Err(CapacityConfigError::Negative(n));
        }
        if n as u64 > MAX_CAPACITY as u64 {
            return Err(CapacityConfigError::TooLarge {
                requested: n as u64,
                max: MAX_CAPACITY,
            });
        }
        Ok(Capacity(n as usize))
    }

    /// JS の number から容量を生成する。切り捨てはしない
    ///
    /// # エラー
    /// - NaN・無限大・小数
    /// - 負の値
    /// - [`MAX_CAPACITY`] を超える
    pub fn from_f64(n: f64) -> Result<Self, CapacityConfigError> {
        if !n.is_finite() {
            return Err(CapacityConfigError::NotInteger);
        }
        if n > MAX_CAPACITY as f64 {
            return Err(CapacityConfigError::TooLarge {
                requested: n as u64,
                max: MAX_CAPACITY,
            });
        }
        if n <= -1.0 {
            return Err(CapacityConfigError::Negative(n as i64));
        }
        if n as i64 as f64 != n {
            return Err(CapacityConfigError::NotInteger);
        }
        Capacity::from_signed(n as i64)
    }

    /// 生の usize 値を返す
    pub fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<i64> for Capacity {
    type Error = CapacityConfigError;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        Capacity::from_signed(n)
    }
}

impl TryFrom<usize> for Capacity {
    type Error = CapacityConfigError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Capacity::new(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_valid() {
        assert_eq!(Capacity::new(0).unwrap().get(), 0);
        assert_eq!(Capacity::from_signed(0).unwrap(), Capacity::ZERO);
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(Capacity::from_signed(-1), Err(CapacityConfigError::Negative(-1)));
    }

    #[test]
    fn test_too_large_rejected() {
        let err = Capacity::new(MAX_CAPACITY + 1).unwrap_err();
        assert!(matches!(err, CapacityConfigError::TooLarge { .. }));
        assert!(Capacity::from_signed(i64::MAX).is_err());
        assert!(Capacity::new(MAX_CAPACITY).is_ok());
    }

    #[test]
    fn test_from_f64_rejects_non_integers() {
        assert_eq!(Capacity::from_f64(-0.5), Err(CapacityConfigError::NotInteger));
        assert_eq!(Capacity::from_f64(2.9), Err(CapacityConfigError::NotInteger));
        assert_eq!(Capacity::from_f64(f64::NAN), Err(CapacityConfigError::NotInteger));
        assert_eq!(Capacity::from_f64(f64::INFINITY), Err(CapacityConfigError::NotInteger));
        assert_eq!(Capacity::from_f64(-3.0), Err(CapacityConfigError::Negative(-3)));
        assert!(matches!(
            Capacity::from_f64(1e20),
            Err(CapacityConfigError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_from_f64_accepts_whole_numbers() {
        assert_eq!(Capacity::from_f64(3.0).unwrap().get(), 3);
        assert_eq!(Capacity::from_f64(0.0).unwrap(), Capacity::ZERO);
        assert_eq!(Capacity::from_f64(MAX_CAPACITY as f64).unwrap().get(), MAX_CAPACITY);
    }
}
