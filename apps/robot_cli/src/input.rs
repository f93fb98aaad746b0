use shared::domain::MovementAxis;

/// One line typed by the operator during a position check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorInput {
    Proceed,
    Jog { axis: MovementAxis, distance: f64 },
    Exit,
    ConfirmExit,
    CancelExit,
}

pub const HELP: &str = "p = proceed, j <x|y|z> <mm> = jog, x = exit, y/n = confirm/cancel exit";

pub fn parse_input(line: &str) -> Result<OperatorInput, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Err("empty input".to_string());
    };
    let input = match command {
        "p" => OperatorInput::Proceed,
        "x" => OperatorInput::Exit,
        "y" => OperatorInput::ConfirmExit,
        "n" => OperatorInput::CancelExit,
        "j" => {
            let axis = parts
                .next()
                .ok_or_else(|| "jog needs an axis".to_string())?
                .parse::<MovementAxis>()?;
            let distance = parts
                .next()
                .ok_or_else(|| "jog needs a distance in mm".to_string())?
                .parse::<f64>()
                .map_err(|err| format!("invalid jog distance: {err}"))?;
            if !distance.is_finite() {
                return Err(format!("jog distance must be a finite number, got {distance}"));
            }
            OperatorInput::Jog { axis, distance }
        }
        other => return Err(format!("unknown input '{other}' ({HELP})")),
    };
    if parts.next().is_some() {
        return Err(format!("unexpected trailing input in '{}'", line.trim()));
    }
    Ok(input)
}
