//! Bridge adapter command implementations.

use {
    crate::{BridgeAction, Cli, Switch, config::Config, open_session},
    anyhow::Result,
    console::style,
    maxbl::GpioPin,
};

/// Bridge command implementation.
pub(crate) fn cmd_bridge(cli: &Cli, config: &Config, action: &BridgeAction) -> Result<()> {
    let mut bl = open_session(cli, config)?;
    let mut bridge = bl.bridge();

    let done = match action {
        BridgeAction::GpioConfig { gpio0, gpio1 } => {
            bridge.gpio_configure(*gpio0, *gpio1)?;
            format!("GPIO modes set to {gpio0:X}/{gpio1:X}")
        },
        BridgeAction::GpioSet { pin, level } => {
            let pin = GpioPin::from_index(*pin)?;
            bridge.gpio_set(pin, level.is_high())?;
            format!("{pin} driven {level:?}")
        },
        BridgeAction::GpioGet => {
            let (gpio0, gpio1) = bridge.gpio_get()?;
            println!("GPIO0: {gpio0}");
            println!("GPIO1: {gpio1}");
            return Ok(());
        },
        BridgeAction::Pullup { state } => {
            let enabled = *state == Switch::On;
            bridge.set_onboard_pullup(enabled)?;
            format!(
                "On-board pull-ups {}",
                if enabled { "enabled" } else { "disabled" }
            )
        },
    };

    if !cli.quiet {
        eprintln!("{} {done}", style("✓").green());
    }
    Ok(())
}
