//! 订单号 Luhn 校验
//!
//! 从左到右遍历，下标 `i` 满足 `i % 2 == len % 2` 的数字乘 2，
//! 乘积大于 9 时减 9，所有数字之和需能被 10 整除。

/// 校验订单号是否通过 Luhn 算法
///
/// 空串和包含非数字字符的串一律视为无效。
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() {
        return false;
    }

    let parity = number.len() % 2;
    let mut sum = 0u32;

    for (i, ch) in number.chars().enumerate() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };
        if i % 2 == parity {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}
