use float_cmp::approx_eq;
use thermal::pid::Pid;
use thermal::safety::HardLimit;

#[test]
fn pid_stability_against_a_simple_heater_model() {
    let mut temp = 25.0;
    let ambient = 25.0;
    let setpoint = 100.0;
    let mut pid = Pid::new(5.0, 0.1, 1.0, setpoint, 0.0, 1.0);
    let dt = 1.0;

    for _ in 0..100 {
        let output = pid.step(temp, dt);
        temp += output * 2.0 - (temp - ambient) * 0.05;
    }

    assert!(
        approx_eq!(f64, temp, setpoint, epsilon = 2.0),
        "final temp {} was not close to setpoint {}",
        temp,
        setpoint
    );
}

#[test]
fn pid_output_never_leaves_configured_bounds() {
    let mut pid = Pid::new(50.0, 5.0, 20.0, 1000.0, 0.0, 255.0);
    let mut temp = 0.0_f64;
    for _ in 0..500 {
        let output = pid.step(temp, 1.0);
        assert!((0.0..=255.0).contains(&output));
        temp += output * 0.05;
    }
}

#[test]
fn hard_limit_flags_overtemp() {
    let limit = HardLimit::new(160.0);
    assert!(!limit.is_exceeded(159.9));
    assert!(limit.is_exceeded(160.1));
}
