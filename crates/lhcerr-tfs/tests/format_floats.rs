use lhcerr_core::errors::Fault;
use lhcerr_tfs::{fortran_float, FIELD_WIDTH};
use proptest::prelude::*;

#[test]
fn fixed_point_values_trim_trailing_zeros() {
    assert_eq!(fortran_float(1.0).unwrap(), "           1.0");
    assert_eq!(fortran_float(0.00012345).unwrap(), "    0.00012345");
    assert_eq!(fortran_float(-3.5).unwrap(), "          -3.5");
    assert_eq!(fortran_float(123456.789).unwrap(), "    123456.789");
    assert_eq!(fortran_float(0.017).unwrap(), "         0.017");
    assert_eq!(fortran_float(0.0001).unwrap(), "        0.0001");
    assert_eq!(fortran_float(-0.0001).unwrap(), "       -0.0001");
}

#[test]
fn fixed_point_window_edges_stay_fixed_point() {
    assert_eq!(fortran_float(999_999_999.0).unwrap(), "   999999999.0");
    assert_eq!(fortran_float(-99_999_999.0).unwrap(), "   -99999999.0");
}

#[test]
fn long_mantissas_round_to_the_digit_budget() {
    assert_eq!(fortran_float(3.141592653589793).unwrap(), " 3.14159265359");
    assert_eq!(
        fortran_float(0.013730737122333012).unwrap(),
        "0.013730737122"
    );
}

#[test]
fn exponential_values_use_signed_two_digit_exponents() {
    assert_eq!(fortran_float(1e-5).unwrap(), "         1E-05");
    assert_eq!(fortran_float(1.5e-5).unwrap(), "       1.5E-05");
    assert_eq!(fortran_float(1.23456789e-5).unwrap(), "1.23456789E-05");
    assert_eq!(fortran_float(-2.5e9).unwrap(), "      -2.5E+09");
    assert_eq!(fortran_float(2.5e10).unwrap(), "       2.5E+10");
    assert_eq!(fortran_float(-6e10).unwrap(), "        -6E+10");
    assert_eq!(fortran_float(4.9e99).unwrap(), "       4.9E+99");
}

#[test]
fn mantissa_rounding_can_carry_into_the_next_decade() {
    assert_eq!(fortran_float(0.000099999999999).unwrap(), "         1E-04");
}

#[test]
fn tiny_magnitudes_collapse_to_zero() {
    assert_eq!(fortran_float(0.0).unwrap(), "           0.0");
    assert_eq!(fortran_float(1e-120).unwrap(), "           0.0");
    assert_eq!(fortran_float(-7.5e-120).unwrap(), "           0.0");
}

#[test]
fn oversized_magnitudes_are_rejected() {
    let fault = fortran_float(1e150).unwrap_err();
    assert!(matches!(fault, Fault::Table(info) if info.code == "value-too-large"));
    assert!(fortran_float(-1e100).is_err());
}

#[test]
fn non_finite_values_are_rejected() {
    let fault = fortran_float(f64::NAN).unwrap_err();
    assert_eq!(fault.info().code, "non-finite-value");
    assert!(fortran_float(f64::INFINITY).is_err());
}

#[test]
fn reparsing_recovers_the_value_to_format_precision() {
    let value = 0.00012345;
    let text = fortran_float(value).unwrap();
    let back: f64 = text.trim().parse().unwrap();
    assert!((back - value).abs() < 1e-12);
}

proptest! {
    #[test]
    fn rendered_fields_are_always_full_width(
        mantissa in 1.0f64..10.0,
        exponent in -90i32..90,
        negative in any::<bool>(),
    ) {
        let value = mantissa * 10f64.powi(exponent) * if negative { -1.0 } else { 1.0 };
        let text = fortran_float(value).unwrap();
        prop_assert_eq!(text.len(), FIELD_WIDTH);
        let back: f64 = text.trim().parse().unwrap();
        prop_assert!((back - value).abs() <= value.abs() * 1e-6);
    }
}
